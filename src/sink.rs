use async_trait::async_trait;
use drift_capture::DeltaSink;
use drift_core::{BoxError, Delta};
use std::io::Write;

/// Writes each delta as one compact JSON object per line.
pub struct JsonLinesSink<W> {
    writer: W,
    written: u64,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: Write + Send> DeltaSink for JsonLinesSink<W> {
    async fn accept(&mut self, delta: Delta) -> Result<(), BoxError> {
        serde_json::to_writer(&mut self.writer, &delta)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), BoxError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drift_core::{DeltaOrigin, RowKey};

    #[tokio::test]
    async fn test_one_delta_per_line() {
        let origin = DeltaOrigin::now("postgresql://db");
        let mut sink = JsonLinesSink::new(Vec::new());
        for id in 1..=2 {
            let key = RowKey::Columns(vec![("id".into(), (id as i64).into())]);
            let row = [("id".to_string(), (id as i64).into())].into_iter().collect();
            sink.accept(Delta::insert(id, &origin, "users", key, row))
                .await
                .unwrap();
        }
        sink.flush().await.unwrap();
        assert_eq!(sink.written(), 2);

        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Delta = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(first.table, "users");
    }
}
