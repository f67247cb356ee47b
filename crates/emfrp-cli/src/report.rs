use ariadne::{Config, IndexType, Label, Report, ReportKind, Source};

use emfrp::SyntaxError;

/// Renders syntax errors as plain-text ariadne reports.
pub fn render_syntax_errors(filename: &str, source_code: &str, errors: &[SyntaxError]) -> String {
    let mut report_bytes = Vec::new();
    for error in errors {
        let written = Report::build(ReportKind::Error, (filename, error.span.clone()))
            .with_config(Config::default().with_color(false).with_index_type(IndexType::Byte))
            .with_message(&error.message)
            .with_label(Label::new((filename, error.span.clone())).with_message(&error.reason))
            .finish()
            .write((filename, Source::from(source_code)), &mut report_bytes);
        if let Err(io_error) = written {
            log::error!("failed to render syntax error report: {io_error}");
            report_bytes.extend_from_slice(format!("{error}\n").as_bytes());
        }
    }
    String::from_utf8_lossy(&report_bytes).into_owned()
}
