//! External conversion service client.
//!
//! The service takes a rendered HTML document and returns its fixed-layout
//! (PDF) rendition; the page count of that rendition is the authoritative
//! measurement. The wire contract is Gotenberg's Chromium route:
//! `POST {base}/forms/chromium/convert/html` with the document as the
//! multipart file `index.html` under the field `files`.

use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;

use crate::error::ConversionError;

/// Route appended to the configured base URL.
pub const CONVERT_ROUTE: &str = "/forms/chromium/convert/html";

/// Error bodies are cut to this many characters in messages.
const BODY_SNIPPET_CHARS: usize = 200;

/// Anything that turns document bytes into fixed-layout (PDF) bytes.
pub trait Converter: Send + Sync {
    fn convert(&self, document: &[u8]) -> Result<Vec<u8>, ConversionError>;
}

/// Blocking client for a Gotenberg-compatible service.
#[derive(Debug, Clone)]
pub struct GotenbergConverter {
    endpoint: String,
    timeout: Duration,
    client: Client,
}

impl GotenbergConverter {
    /// `base_url` is the service root, e.g. `http://localhost:3000`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ConversionError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConversionError::Transport(e.to_string()))?;
        Ok(Self {
            endpoint: format!("{}{CONVERT_ROUTE}", base_url.trim_end_matches('/')),
            timeout,
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Converter for GotenbergConverter {
    fn convert(&self, document: &[u8]) -> Result<Vec<u8>, ConversionError> {
        let part = Part::bytes(document.to_vec())
            .file_name("index.html")
            .mime_str("text/html")
            .map_err(|e| ConversionError::Transport(e.to_string()))?;
        let form = Form::new().part("files", part);

        log::debug!("converting {} byte(s) via {}", document.len(), self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ConversionError::Status {
                status: status.as_u16(),
                body: snippet(&body),
            });
        }
        let bytes = response.bytes().map_err(|e| self.transport_error(e))?;
        Ok(bytes.to_vec())
    }
}

impl GotenbergConverter {
    fn transport_error(&self, err: reqwest::Error) -> ConversionError {
        if err.is_timeout() {
            ConversionError::Timeout(self.timeout)
        } else {
            ConversionError::Transport(err.to_string())
        }
    }
}

/// Page count of a PDF document.
pub fn count_pdf_pages(pdf: &[u8]) -> Result<u32, ConversionError> {
    let document =
        lopdf::Document::load_mem(pdf).map_err(|e| ConversionError::InvalidDocument(e.to_string()))?;
    let pages = document.get_pages().len();
    u32::try_from(pages).map_err(|_| ConversionError::InvalidDocument(format!("{pages} pages")))
}

/// First characters of `text`, on one line.
pub(crate) fn snippet(text: &str) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= BODY_SNIPPET_CHARS {
        flat
    } else {
        let cut: String = flat.chars().take(BODY_SNIPPET_CHARS).collect();
        format!("{cut}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::{PageCountOracle, PageCountSource};
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::time::Instant;

    /// A listener that completes the handshake but never answers.
    fn silent_service() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    #[test]
    fn endpoint_joins_base_and_route() {
        let c = GotenbergConverter::new("http://localhost:3000/", Duration::from_secs(5)).unwrap();
        assert_eq!(c.endpoint(), "http://localhost:3000/forms/chromium/convert/html");
    }

    #[test]
    fn closed_port_is_a_transport_error() {
        let c = GotenbergConverter::new("http://127.0.0.1:1", Duration::from_secs(5)).unwrap();
        assert!(matches!(c.convert(b"<p>x</p>"), Err(ConversionError::Transport(_))));
    }

    #[test]
    fn unresponsive_service_times_out() {
        let (_listener, url) = silent_service();
        let timeout = Duration::from_millis(200);
        let c = GotenbergConverter::new(&url, timeout).unwrap();

        let started = Instant::now();
        let result = c.convert(b"<p>x</p>");
        assert!(matches!(result, Err(ConversionError::Timeout(t)) if t == timeout), "{result:?}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn timeout_falls_through_to_page_break_heuristics() {
        let (_listener, url) = silent_service();
        let c = GotenbergConverter::new(&url, Duration::from_millis(200)).unwrap();
        let oracle = PageCountOracle::standard(Some(Arc::new(c) as Arc<dyn Converter>));

        let started = Instant::now();
        let result = oracle.measure(br#"<p class="page-break">a</p><p>b</p>"#).unwrap();
        assert_eq!(result.source, PageCountSource::HeuristicBreaks);
        assert_eq!(result.value, 2);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn garbage_is_not_a_pdf() {
        assert!(matches!(
            count_pdf_pages(b"<html>not a pdf</html>"),
            Err(ConversionError::InvalidDocument(_))
        ));
    }

    #[test]
    fn snippet_flattens_and_truncates() {
        assert_eq!(snippet("a\n  b\tc"), "a b c");
        let long = "x".repeat(500);
        assert_eq!(snippet(&long).chars().count(), BODY_SNIPPET_CHARS + 1);
    }
}
