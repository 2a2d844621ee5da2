//! Report rendering over stored recommendations

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use super::{Category, Recommendation, RecommendationsByContainer};

pub const NO_RECOMMENDATIONS: &str = "No optimization recommendations available.";

const REPORT_TITLE: &str = "Container Resource Optimization Report";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
    Html,
}

impl From<&str> for ReportFormat {
    /// Unknown names fall back to text
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => ReportFormat::Json,
            "html" => ReportFormat::Html,
            _ => ReportFormat::Text,
        }
    }
}

fn by_category(recs: &[Recommendation]) -> BTreeMap<Category, Vec<&Recommendation>> {
    let mut grouped: BTreeMap<Category, Vec<&Recommendation>> = BTreeMap::new();
    for rec in recs {
        grouped.entry(rec.category).or_default().push(rec);
    }
    grouped
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn text_report(recs: &RecommendationsByContainer) -> String {
    let rule = "=".repeat(80);
    let mut lines = vec![REPORT_TITLE.to_string(), rule.clone(), String::new()];

    for (container_id, container_recs) in recs {
        lines.push(format!("Container: {}", container_id));
        lines.push("-".repeat(80));

        for (category, items) in by_category(container_recs) {
            lines.push(format!("\n{} Recommendations:", capitalize(category.as_str())));
            for (i, rec) in items.iter().enumerate() {
                lines.push(format!("\n{}. {}", i + 1, rec.description));
                lines.push(format!("   Impact: {}", capitalize(rec.impact.as_str())));
                lines.push(format!("   Resource: {}", rec.resource));
                if !rec.suggestions.is_empty() {
                    lines.push("   Suggestions:".to_string());
                    for s in &rec.suggestions {
                        lines.push(format!("   - {}", s));
                    }
                }
                if let Some(command) = &rec.command {
                    lines.push(format!("   Command: {}", command));
                }
            }
        }
        lines.push(format!("\n{}\n", rule));
    }

    lines.join("\n")
}

/// Minimal HTML escaping for user-facing strings.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn push_style(html: &mut String) {
    html.push_str("<style>\n");
    html.push_str(
        "body{font-family:Arial,sans-serif;margin:20px}\n\
         h1,h2,h3{color:#333}\n\
         .container{margin-bottom:30px;border:1px solid #ddd;padding:15px;border-radius:5px}\n\
         .recommendation{margin-bottom:20px;padding:10px;border-left:4px solid #ccc}\n\
         .sizing{border-left-color:#4caf50}\n\
         .performance{border-left-color:#2196f3}\n\
         .cost{border-left-color:#ffc107}\n\
         .impact-low{color:#4caf50}\n\
         .impact-medium{color:#ffc107}\n\
         .impact-high{color:#f44336}\n\
         .command{background-color:#f5f5f5;padding:8px;border-radius:4px;font-family:monospace}\n",
    );
    html.push_str("</style>\n");
}

pub fn html_report(recs: &RecommendationsByContainer, generated_at: DateTime<Utc>) -> String {
    let mut html = String::with_capacity(4096);
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n");
    let _ = writeln!(html, "<title>{}</title>", REPORT_TITLE);
    push_style(&mut html);
    html.push_str("</head>\n<body>\n");
    let _ = writeln!(html, "<h1>{}</h1>", REPORT_TITLE);
    let _ = writeln!(
        html,
        "<p>Generated on: {}</p>",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    for (container_id, container_recs) in recs {
        html.push_str("<div class=\"container\">\n");
        let _ = writeln!(html, "<h2>Container: {}</h2>", html_escape(container_id));

        for (category, items) in by_category(container_recs) {
            let _ = writeln!(html, "<h3>{} Recommendations</h3>", capitalize(category.as_str()));
            for rec in items {
                let _ = writeln!(html, "<div class=\"recommendation {}\">", category);
                let _ = writeln!(html, "<p>{}</p>", html_escape(&rec.description));
                let _ = writeln!(
                    html,
                    "<p>Impact: <span class=\"impact-{}\">{}</span> &middot; Resource: {}</p>",
                    rec.impact,
                    capitalize(rec.impact.as_str()),
                    rec.resource
                );
                if !rec.suggestions.is_empty() {
                    html.push_str("<div class=\"suggestions\">\n<p>Suggestions:</p>\n<ul>\n");
                    for s in &rec.suggestions {
                        let _ = writeln!(html, "<li>{}</li>", html_escape(s));
                    }
                    html.push_str("</ul>\n</div>\n");
                }
                if let Some(command) = &rec.command {
                    let _ = writeln!(html, "<div class=\"command\">{}</div>", html_escape(command));
                }
                html.push_str("</div>\n");
            }
        }
        html.push_str("</div>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::{Action, Impact, Resource};

    fn rec(container_id: &str, category: Category, description: &str) -> Recommendation {
        Recommendation {
            container_id: container_id.to_string(),
            category,
            resource: Resource::Cpu,
            action: Action::Decrease,
            current_usage: Some(15.0),
            recommended_value: Some(22.5),
            threshold: None,
            impact: Impact::Low,
            description: description.to_string(),
            command: Some("docker update --cpus=0.2 abc".to_string()),
            suggestions: vec!["first".to_string()],
            estimated_savings: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_format_fallback() {
        assert_eq!(ReportFormat::from("JSON"), ReportFormat::Json);
        assert_eq!(ReportFormat::from("html"), ReportFormat::Html);
        assert_eq!(ReportFormat::from("pdf"), ReportFormat::Text);
    }

    #[test]
    fn test_text_groups_by_category() {
        let mut recs = RecommendationsByContainer::new();
        recs.insert(
            "abc".to_string(),
            vec![
                rec("abc", Category::Cost, "cost one"),
                rec("abc", Category::Sizing, "sizing one"),
                rec("abc", Category::Sizing, "sizing two"),
            ],
        );

        let text = text_report(&recs);
        assert!(text.starts_with("Container Resource Optimization Report\n"));
        assert!(text.contains("Container: abc"));
        let sizing = text.find("Sizing Recommendations:").unwrap();
        let cost = text.find("Cost Recommendations:").unwrap();
        assert!(sizing < cost);
        assert!(text.contains("\n2. sizing two"));
        assert!(text.contains("   Impact: Low"));
        assert!(text.contains("   Resource: cpu"));
        assert!(text.contains("   - first"));
        assert!(text.contains("   Command: docker update --cpus=0.2 abc"));
    }

    #[test]
    fn test_html_escapes_user_text() {
        let mut recs = RecommendationsByContainer::new();
        recs.insert("abc".to_string(), vec![rec("abc", Category::Performance, "<b>&</b>")]);

        let html = html_report(&recs, Utc::now());
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("&lt;b&gt;&amp;&lt;/b&gt;"));
        assert!(html.contains("class=\"recommendation performance\""));
        assert!(html.contains("class=\"impact-low\""));
        assert!(!html.contains("<b>&</b>"));
    }
}
