use crate::emit::Descriptor;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;

/// Render descriptors as a pretty JSON array with a four-space indent.
///
/// Resolved metrics serialize their fields alphabetically and supplied
/// objects keep `serde_json`'s sorted map order, so keys come out sorted.
pub fn render_metrics_json(metrics: &[Descriptor]) -> anyhow::Result<String> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    metrics.serialize(&mut ser)?;
    buf.push(b'\n');
    Ok(String::from_utf8(buf)?)
}
