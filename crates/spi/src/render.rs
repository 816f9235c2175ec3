use crate::codec::Sink;
use crate::context::Context;
use crate::error::Result;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One named numeric series.
///
/// `labels` name the points of `values`; it is either empty or the same length.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct RenderingData {
    /// Series name.
    pub name: String,
    /// Points in order.
    pub values: Vec<f64>,
    /// Point labels.
    pub labels: Vec<String>,
}

impl RenderingData {
    /// Creates an unlabelled series.
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
            labels: Vec::new(),
        }
    }

    /// Names the points, in order.
    #[must_use]
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    /// Label of point `idx`, falling back to its position.
    #[must_use]
    pub fn label(&self, idx: usize) -> String {
        self.labels
            .get(idx)
            .cloned()
            .unwrap_or_else(|| idx.to_string())
    }
}

/// Turns series into an artifact (a chart, a table) written to a sink.
///
/// Renderers keep no state between calls. The sink belongs to the caller and
/// is not closed by `render`.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// MIME type of the artifact.
    fn content_type(&self) -> &str;

    /// Writes the artifact for `data` to `sink`.
    async fn render(
        &self,
        ctx: &Context,
        sink: &mut (dyn Sink + '_),
        data: &[RenderingData],
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::AsyncWriteExt;

    /// One `name,label,value` line per point.
    struct CsvRenderer;

    #[async_trait]
    impl Renderer for CsvRenderer {
        fn content_type(&self) -> &str {
            "text/csv"
        }

        async fn render(
            &self,
            ctx: &Context,
            sink: &mut (dyn Sink + '_),
            data: &[RenderingData],
        ) -> Result<()> {
            for series in data {
                ctx.check()?;
                for (idx, value) in series.values.iter().enumerate() {
                    let line = format!("{},{},{value}\n", series.name, series.label(idx));
                    sink.write_all(line.as_bytes()).await?;
                }
            }
            sink.flush().await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_render_to_sink() {
        let data = vec![
            RenderingData::new("load", vec![1.5, 2.0])
                .with_labels(vec!["mon".to_string(), "tue".to_string()]),
            RenderingData::new("temp", vec![20.0]),
        ];
        let mut out: Vec<u8> = Vec::new();

        CsvRenderer
            .render(&Context::new(), &mut out, &data)
            .await
            .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "load,mon,1.5\nload,tue,2\ntemp,0,20\n"
        );
    }

    #[tokio::test]
    async fn test_render_is_stateless() {
        let data = vec![RenderingData::new("x", vec![1.0])];
        let mut first: Vec<u8> = Vec::new();
        let mut second: Vec<u8> = Vec::new();
        CsvRenderer.render(&Context::new(), &mut first, &data).await.unwrap();
        CsvRenderer.render(&Context::new(), &mut second, &data).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_render_honours_cancel() {
        let ctx = Context::new();
        ctx.cancel();
        let mut out: Vec<u8> = Vec::new();
        let err = CsvRenderer
            .render(&ctx, &mut out, &[RenderingData::new("x", vec![1.0])])
            .await
            .unwrap_err();
        assert!(err.is_cancel());
        assert!(out.is_empty());
    }
}
