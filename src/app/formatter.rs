use crate::app::envfs::FileInfo;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Bytes left as-is in a path segment (RFC 3986 unreserved).
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const PATH: &AsciiSet = &SEGMENT.remove(b'/');

pub struct OutputGenerator;

impl OutputGenerator {
    /// One line per child: raw size, then the name (`/` for directories).
    pub fn generate_listing(entries: &[FileInfo]) -> String {
        let width = entries
            .iter()
            .map(|e| e.size.to_string().len())
            .max()
            .unwrap_or(0);

        let mut output = String::new();
        for entry in entries {
            let marker = if entry.is_dir { "/" } else { "" };
            output.push_str(&format!(
                "{:>width$}  {}{}\n",
                entry.size,
                entry.name,
                marker,
                width = width
            ));
        }

        output.trim_end().to_string()
    }

    /// Directory index page for a decoded request path without `index.html`.
    /// Links are percent-encoded; link text is HTML-escaped.
    pub fn generate_index_html(request_path: &str, entries: &[FileInfo]) -> String {
        let mut base = utf8_percent_encode(request_path, PATH).to_string();
        if !base.ends_with('/') {
            base.push('/');
        }

        let mut out = String::from("<!doctype html>\n<meta name=\"viewport\" content=\"width=device-width\">\n<pre>\n");
        for entry in entries {
            let marker = if entry.is_dir { "/" } else { "" };
            out.push_str(&format!(
                "<a href=\"{}{}{}\">{}{}</a>\n",
                base,
                utf8_percent_encode(&entry.name, SEGMENT),
                marker,
                escape_html(&entry.name),
                marker
            ));
        }
        out.push_str("</pre>\n");
        out
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
