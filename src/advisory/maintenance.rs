use std::sync::LazyLock;
use std::time::Duration;

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use regex::Regex;
use tracing::debug;

use crate::probe::Network;
use crate::severity::Severity;

/// Words that, together with the product name, mark a maintenance notice.
const NOTICE_WORDS: &[&str] = &["maintenance", "downtime", "scheduled"];

/// Elements whose text is never rendered.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "head"];

pub const DATE_FALLBACK: &str = "date on page";
pub const NO_NOTICE: &str = "No explicit Overwatch maintenance notice.";
pub const NOT_CHECKABLE: &str = "Maintenance page not checkable.";

/// "Tue, 4 Mar 2026", "04 March, 2026", "4 Mar 2026".
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:(Mon|Tue|Wed|Thu|Fri|Sat|Sun)\w*,?\s*)?(\d{1,2})\s*(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\w*[, ]+\s*(\d{4})",
    )
    .expect("valid maintenance date regex")
});

/// Result of the maintenance page check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceNotice {
    pub state: Severity,
    pub message: String,
}

impl MaintenanceNotice {
    pub fn not_checkable() -> Self {
        Self {
            state: Severity::Unknown,
            message: NOT_CHECKABLE.to_string(),
        }
    }
}

/// Extract the visible text of an HTML document, text nodes joined by spaces.
pub fn visible_text(html: &str) -> std::io::Result<String> {
    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut html.as_bytes())?;

    let mut out = String::new();
    collect_text(&dom.document, &mut out);
    Ok(out)
}

fn collect_text(handle: &Handle, out: &mut String) {
    match &handle.data {
        NodeData::Text { contents } => {
            let text = contents.borrow();
            let text = text.trim();
            if !text.is_empty() {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(text);
            }
        }
        NodeData::Element { name, .. } if HIDDEN_ELEMENTS.contains(&name.local.as_ref()) => {}
        NodeData::Document | NodeData::Element { .. } => {
            for child in handle.children.borrow().iter() {
                collect_text(child, out);
            }
        }
        _ => {}
    }
}

/// First "D Mon YYYY" date mentioned in `text`.
pub fn find_date(text: &str) -> Option<String> {
    DATE_RE
        .captures(text)
        .map(|caps| format!("{} {} {}", &caps[2], &caps[3], &caps[4]))
}

/// Decide whether the page text announces maintenance for `product`.
pub fn assess_text(text: &str, product: &str) -> MaintenanceNotice {
    let lower = text.to_lowercase();
    let product = product.to_lowercase();

    let announced =
        lower.contains(&product) && NOTICE_WORDS.iter().any(|word| lower.contains(word));

    if announced {
        let when = find_date(text).unwrap_or_else(|| DATE_FALLBACK.to_string());
        MaintenanceNotice {
            state: Severity::Warn,
            message: format!("Maintenance notice found ({when})."),
        }
    } else {
        MaintenanceNotice {
            state: Severity::Ok,
            message: NO_NOTICE.to_string(),
        }
    }
}

/// Fetch the maintenance page and assess it. Never fails: transport errors,
/// non-2xx responses and unparsable documents all yield `unknown`.
pub async fn check_maintenance<N: Network>(
    net: &N,
    url: &str,
    product: &str,
    timeout: Duration,
) -> MaintenanceNotice {
    let page = match net.get(url, timeout).await {
        Ok(page) if page.is_success() => page,
        Ok(page) => {
            debug!(status = page.status, "maintenance page returned an error status");
            return MaintenanceNotice::not_checkable();
        }
        Err(e) => {
            debug!(error = %e, "maintenance page fetch failed");
            return MaintenanceNotice::not_checkable();
        }
    };

    match visible_text(&page.body) {
        Ok(text) => assess_text(&text, product),
        Err(e) => {
            debug!(error = %e, "maintenance page could not be parsed");
            MaintenanceNotice::not_checkable()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::LiveNetwork;

    #[test]
    fn test_visible_text_skips_scripts() {
        let html = r#"<html><head><title>t</title><style>p{}</style></head>
            <body><p>Overwatch</p><script>var maintenance = 1;</script><div>all good</div></body></html>"#;
        let text = visible_text(html).expect("parse");
        assert_eq!(text, "Overwatch all good");
    }

    #[test]
    fn test_find_date_variants() {
        assert_eq!(
            find_date("Scheduled for Tuesday, 4 March, 2026 at 10:00").as_deref(),
            Some("4 Mar 2026")
        );
        assert_eq!(find_date("on 12 Dec 2025").as_deref(), Some("12 Dec 2025"));
        assert_eq!(find_date("no date here"), None);
    }

    #[test]
    fn test_notice_with_date() {
        let notice = assess_text(
            "Overwatch 2 scheduled maintenance on Wed, 7 Jan 2026",
            "overwatch",
        );
        assert_eq!(notice.state, Severity::Warn);
        assert_eq!(notice.message, "Maintenance notice found (7 Jan 2026).");
    }

    #[test]
    fn test_notice_without_date_uses_fallback() {
        let notice = assess_text("OVERWATCH downtime announced", "overwatch");
        assert_eq!(notice.state, Severity::Warn);
        assert!(notice.message.contains(DATE_FALLBACK));
    }

    #[test]
    fn test_other_product_is_ok() {
        let notice = assess_text("Diablo IV scheduled maintenance 7 Jan 2026", "overwatch");
        assert_eq!(notice.state, Severity::Ok);

        let notice = assess_text("Overwatch patch notes", "overwatch");
        assert_eq!(notice.state, Severity::Ok);
        assert_eq!(notice.message, NO_NOTICE);
    }

    #[tokio::test]
    async fn test_check_against_mock_page() {
        let mut server = mockito::Server::new_async().await;
        let _page = server
            .mock("GET", "/article")
            .with_status(200)
            .with_body("<p>Overwatch scheduled maintenance: Thu, 15 Jan 2026</p>")
            .create_async()
            .await;
        let _missing = server
            .mock("GET", "/gone")
            .with_status(500)
            .with_body("<p>Overwatch maintenance</p>")
            .create_async()
            .await;

        let net = LiveNetwork::new().expect("client");
        let timeout = Duration::from_secs(5);

        let notice = check_maintenance(
            &net,
            &format!("{}/article", server.url()),
            "overwatch",
            timeout,
        )
        .await;
        assert_eq!(notice.state, Severity::Warn);
        assert_eq!(notice.message, "Maintenance notice found (15 Jan 2026).");

        let notice =
            check_maintenance(&net, &format!("{}/gone", server.url()), "overwatch", timeout)
                .await;
        assert_eq!(notice, MaintenanceNotice::not_checkable());
    }
}
