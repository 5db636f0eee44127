// src/pipeline.rs

use crate::aggregate::ResultSet;
use crate::error::BillError;
use crate::extract::TextSource;
use crate::interpret::interpret;
use crate::llm_extract::ModelClient;
use crate::prompt::build_prompt;
use crate::record::{BillFields, BillRecord};
use crate::session::{InputSet, ProcessingContext, display_name};
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{Instrument, error, info, warn};

/// `*.pdf` files (any case) directly inside `dir`, sorted by name.
pub fn discover_pdfs(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, BillError> {
    let mut pdfs: Vec<PathBuf> = fs::read_dir(dir.as_ref())?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    pdfs.sort();
    Ok(pdfs)
}

/// Extract → prompt → model → interpret → normalize, one file at a time.
pub struct Pipeline<E, M> {
    extractor: E,
    model: M,
}

impl<E: TextSource, M: ModelClient> Pipeline<E, M> {
    pub fn new(extractor: E, model: M) -> Self {
        Self { extractor, model }
    }

    /// Always yields a record; every failure is folded into it.
    pub async fn process_file(&self, path: &Path) -> BillRecord {
        let filename = display_name(path);
        let span = tracing::info_span!("bill", filename = %filename);

        async {
            match self.try_process(path, &filename).await {
                Ok(fields) => {
                    let (filled, total) = fields.coverage();
                    info!(
                        filled,
                        total,
                        provider = %fields.provider,
                        amount_due = ?fields.amount_due,
                        tariff_split = fields.tariff_split,
                        "Bill parsed"
                    );
                    BillRecord::bill(filename.clone(), fields)
                }
                Err(e) => {
                    error!(error = %e, "Bill failed");
                    BillRecord::failed(filename.clone(), e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn try_process(&self, path: &Path, filename: &str) -> Result<BillFields, BillError> {
        let text = self.extractor.extract(path)?;
        info!(chars = text.len(), "Extracted text");

        let prompt = build_prompt(&text);
        let reply = self.model.complete(&prompt).await?;
        info!(model = %self.model.model(), reply_chars = reply.len(), "Model replied");

        let map = interpret(&reply, filename)?;
        Ok(BillFields::from_map(&map))
    }

    /// Sequential, in input order; one record per path.
    pub async fn process_batch(&self, paths: &[PathBuf]) -> ResultSet {
        let mut results = ResultSet::new();
        for (i, path) in paths.iter().enumerate() {
            info!(n = i + 1, of = paths.len(), path = %path.display(), "Processing");
            results.push(self.process_file(path).await);
        }

        let (ok, failed) = results.counts();
        info!(ok, failed, "Batch complete");
        results
    }

    /// One watch tick. Runs a batch only when `inputs` differs from what
    /// `ctx` last saw, then writes any results not yet on disk. Nothing
    /// here is fatal; a failed write is retried on the next tick without
    /// calling the model again. Returns true when a new batch ran.
    pub async fn refresh(
        &self,
        ctx: &mut ProcessingContext,
        inputs: &InputSet,
        output: &Path,
    ) -> bool {
        if inputs.is_empty() {
            if ctx.results().is_some() {
                info!("Input directory emptied, clearing previous results");
                ctx.clear();
            }
            return false;
        }

        let ran = ctx.needs_processing(inputs);
        if ran {
            info!(files = inputs.len(), fingerprint = %inputs.fingerprint(), "Input set changed");
            let results = self.process_batch(&inputs.paths()).await;
            ctx.record(inputs, results);
        }

        if let Some(results) = ctx.unsaved_results() {
            match results.write_csv_file(output) {
                Ok(()) => ctx.mark_saved(),
                Err(e) => {
                    warn!(path = %output.display(), error = %e, "Could not write results, retrying next tick")
                }
            }
        }
        ran
    }

    /// Poll `input_dir` every `interval` until `stop` resolves. `stop` is
    /// created once by the caller, so a stop request that arrives during a
    /// batch ends the loop as soon as the batch is done.
    pub async fn watch<S, F>(
        &self,
        input_dir: &Path,
        output: &Path,
        interval: Duration,
        stop: S,
        mut on_batch: F,
    ) where
        S: Future,
        F: FnMut(&ResultSet),
    {
        let mut ctx = ProcessingContext::new();
        tokio::pin!(stop);
        info!(dir = %input_dir.display(), every = ?interval, "Watching for bills");

        loop {
            match discover_pdfs(input_dir) {
                Ok(paths) => {
                    let inputs = InputSet::from_paths(&paths);
                    if self.refresh(&mut ctx, &inputs, output).await {
                        if let Some(results) = ctx.results() {
                            on_batch(results);
                        }
                    }
                }
                Err(e) => {
                    error!(dir = %input_dir.display(), error = %e, "Could not scan input directory")
                }
            }

            tokio::select! {
                _ = &mut stop => {
                    info!("Stopping watch");
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Canned text per file name.
    struct FakeExtractor(HashMap<&'static str, Result<&'static str, &'static str>>);

    impl TextSource for FakeExtractor {
        fn extract(&self, path: &Path) -> Result<String, BillError> {
            match self.0.get(display_name(path).as_str()) {
                Some(Ok(text)) => Ok(text.to_string()),
                Some(Err(msg)) => Err(BillError::Extraction(msg.to_string())),
                None => Err(BillError::Extraction("no such file".to_string())),
            }
        }
    }

    /// Replies keyed on a marker in the bill text; records every prompt.
    struct FakeModel {
        replies: Vec<(&'static str, Result<&'static str, &'static str>)>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ModelClient for FakeModel {
        async fn complete(&self, prompt: &str) -> Result<String, BillError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            for (marker, reply) in &self.replies {
                if prompt.contains(marker) {
                    return reply
                        .map(str::to_string)
                        .map_err(|e| BillError::Model(e.to_string()));
                }
            }
            Ok("no idea".to_string())
        }

        fn model(&self) -> &str {
            "fake"
        }
    }

    const JANUARY_TEXT: &str =
        "Usage: 100 kWh at R2.00/kWh from 2024-01-01 to 2024-01-31, Amount Due R200.00";

    const JANUARY_REPLY: &str = r#"Here is the JSON:
{
  "provider": "",
  "account_number": "",
  "start_date": "2024-01-01",
  "end_date": "2024-01-31",
  "kWh_usage": 100,
  "cost_per_kWh": 2.00,
  "service_charge": "",
  "reading_type": "Actual",
  "amount_due": 200.00,
  "tariff_split": false,
  "notes": ""
}"#;

    fn pipeline() -> Pipeline<FakeExtractor, FakeModel> {
        let extractor = FakeExtractor(HashMap::from([
            ("scanned.pdf", Err("No readable text found in PDF")),
            ("quota.pdf", Ok("QUOTA-MARKER electricity bill")),
            ("january.pdf", Ok(JANUARY_TEXT)),
            ("chatty.pdf", Ok("CHATTY-MARKER")),
        ]));
        let model = FakeModel {
            replies: vec![
                ("QUOTA-MARKER", Err("429 Too Many Requests")),
                ("Usage: 100 kWh", Ok(JANUARY_REPLY)),
            ],
            prompts: Mutex::new(Vec::new()),
        };
        Pipeline::new(extractor, model)
    }

    #[tokio::test]
    async fn test_end_to_end_single_tariff() {
        let pipeline = pipeline();
        let record = pipeline.process_file(Path::new("bills/january.pdf")).await;

        assert_eq!(record.filename, "january.pdf");
        let fields = record.fields().expect("bill fields");
        assert_eq!(fields.kwh_usage, Some(100.0));
        assert_eq!(fields.cost_per_kwh, Some(2.00));
        assert_eq!(fields.amount_due, Some(200.00));
        assert_eq!(fields.start_date.unwrap().to_string(), "2024-01-01");
        assert_eq!(fields.end_date.unwrap().to_string(), "2024-01-31");
        assert!(!fields.tariff_split);
        assert_eq!(fields.notes, "");

        let prompts = pipeline.model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].ends_with(&format!("{JANUARY_TEXT}\n")));
    }

    #[tokio::test]
    async fn test_batch_keeps_one_row_per_file_in_order() {
        let pipeline = pipeline();
        let paths = vec![
            PathBuf::from("bills/scanned.pdf"),
            PathBuf::from("bills/quota.pdf"),
            PathBuf::from("bills/january.pdf"),
        ];

        let results = pipeline.process_batch(&paths).await;
        let records = results.records();

        assert_eq!(records.len(), 3);
        assert_eq!(
            records.iter().map(|r| r.filename.as_str()).collect::<Vec<_>>(),
            vec!["scanned.pdf", "quota.pdf", "january.pdf"]
        );
        assert_eq!(records[0].error(), Some("No readable text found in PDF"));
        assert!(records[1].error().unwrap().contains("429 Too Many Requests"));
        assert!(records[2].fields().is_some());
        assert_eq!(results.counts(), (1, 2));

        // the failed extraction never reached the model
        assert_eq!(pipeline.model.prompts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unparseable_reply_becomes_error_row() {
        let pipeline = pipeline();
        let record = pipeline.process_file(Path::new("chatty.pdf")).await;

        let error = record.error().expect("error row");
        assert!(error.starts_with("Could not extract JSON from model output"));
        assert!(error.ends_with("no idea"));
    }

    #[tokio::test]
    async fn test_refresh_retries_write_without_reprocessing() {
        let pipeline = pipeline();
        let dir = tempfile::tempdir().unwrap();
        let inputs = InputSet::from_entries(vec![(PathBuf::from("bills/january.pdf"), 10)]);
        let mut ctx = ProcessingContext::new();

        // a directory cannot be opened as the output file
        let blocked = dir.path().to_path_buf();
        assert!(pipeline.refresh(&mut ctx, &inputs, &blocked).await);
        assert!(ctx.unsaved_results().is_some());

        assert!(!pipeline.refresh(&mut ctx, &inputs, &blocked).await);
        assert_eq!(pipeline.model.prompts.lock().unwrap().len(), 1);

        let output = dir.path().join("results.csv");
        assert!(!pipeline.refresh(&mut ctx, &inputs, &output).await);
        assert!(ctx.unsaved_results().is_none());
        assert_eq!(std::fs::read_to_string(&output).unwrap().lines().count(), 2);
        assert_eq!(pipeline.model.prompts.lock().unwrap().len(), 1);

        let empty = InputSet::from_entries(Vec::new());
        assert!(!pipeline.refresh(&mut ctx, &empty, &output).await);
        assert!(ctx.results().is_none());
    }

    #[tokio::test]
    async fn test_watch_runs_once_per_input_set_until_stopped() {
        let pipeline = pipeline();
        let dir = tempfile::tempdir().unwrap();
        let input_dir = dir.path().join("bills");
        std::fs::create_dir(&input_dir).unwrap();
        std::fs::write(input_dir.join("january.pdf"), b"x").unwrap();
        let output = dir.path().join("results.csv");

        let mut batches = 0;
        let stop = tokio::time::sleep(Duration::from_millis(60));
        pipeline
            .watch(&input_dir, &output, Duration::from_millis(5), stop, |_| batches += 1)
            .await;

        assert_eq!(batches, 1);
        assert_eq!(pipeline.model.prompts.lock().unwrap().len(), 1);
        assert!(output.exists());
    }

    #[tokio::test]
    async fn test_watch_survives_missing_input_dir() {
        let pipeline = pipeline();
        let dir = tempfile::tempdir().unwrap();

        let stop = tokio::time::sleep(Duration::from_millis(20));
        pipeline
            .watch(
                &dir.path().join("gone"),
                &dir.path().join("results.csv"),
                Duration::from_millis(5),
                stop,
                |_| panic!("nothing to process"),
            )
            .await;

        assert!(pipeline.model.prompts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_discover_pdfs() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "a.PDF", "notes.txt", "c.pdf.bak"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.pdf")).unwrap();

        let found: Vec<String> = discover_pdfs(dir.path())
            .unwrap()
            .iter()
            .map(|p| display_name(p))
            .collect();
        assert_eq!(found, vec!["a.PDF", "b.pdf"]);
    }

    #[test]
    fn test_discover_missing_dir_is_error() {
        assert!(discover_pdfs("/definitely/not/a/dir").is_err());
    }
}
