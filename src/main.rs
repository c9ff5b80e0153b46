fn main() -> anyhow::Result<()> {
    envfs::app::run()
}
