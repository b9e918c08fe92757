use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{error, info, instrument};

use crate::error::{Result, RevflowError};
use crate::types::{Destination, RecordSet, RecordSource, Stage, Transformer};

/// One failed stage execution, recorded in collect mode.
#[derive(Debug, Clone, Serialize)]
pub struct StageFailure {
    pub stage: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-run state threaded through the orchestrator.
///
/// `data` always reflects the output of the most recently completed stage;
/// `errors` is append-only within a run.
#[derive(Debug, Serialize)]
pub struct PipelineContext {
    pub data: RecordSet,
    pub metadata: Map<String, Value>,
    pub errors: Vec<StageFailure>,
}

impl PipelineContext {
    fn new(initial_data: Option<RecordSet>) -> Self {
        let data = initial_data.unwrap_or_default();
        let mut metadata = Map::new();
        metadata.insert("start_time".to_string(), json!(Utc::now().to_rfc3339()));
        metadata.insert("stages_completed".to_string(), json!([]));
        metadata.insert("record_count".to_string(), json!(data.len()));
        metadata.insert("stage_durations_ms".to_string(), json!({}));
        Self {
            data,
            metadata,
            errors: Vec::new(),
        }
    }

    fn mark_stage_complete(&mut self, stage_name: &str, duration_ms: u64) {
        if let Some(Value::Array(completed)) = self.metadata.get_mut("stages_completed") {
            completed.push(json!(stage_name));
        }
        if let Some(Value::Object(durations)) = self.metadata.get_mut("stage_durations_ms") {
            durations.insert(stage_name.to_string(), json!(duration_ms));
        }
        self.metadata
            .insert("record_count".to_string(), json!(self.data.len()));
    }

    fn add_error(&mut self, stage: &str, error: &RevflowError) {
        self.errors.push(StageFailure {
            stage: stage.to_string(),
            error: error.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Names of the stages that completed successfully, in execution order.
    pub fn stages_completed(&self) -> Vec<String> {
        match self.metadata.get("stages_completed") {
            Some(Value::Array(names)) => names
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// The four fixed extension points observers can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    PreRun,
    PostRun,
    PreStage,
    PostStage,
}

impl HookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::PreRun => "pre_run",
            HookEvent::PostRun => "post_run",
            HookEvent::PreStage => "pre_stage",
            HookEvent::PostStage => "post_stage",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookEvent {
    type Err = RevflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pre_run" => Ok(HookEvent::PreRun),
            "post_run" => Ok(HookEvent::PostRun),
            "pre_stage" => Ok(HookEvent::PreStage),
            "post_stage" => Ok(HookEvent::PostStage),
            other => Err(RevflowError::Config(format!(
                "invalid hook event: '{other}'"
            ))),
        }
    }
}

type HookFn = Box<dyn Fn(&Pipeline, &PipelineContext, Option<&Stage>) + Send + Sync>;

/// A data pipeline for revenue operations workflows.
///
/// Stages execute strictly in order on a single thread. A failing stage is
/// either recorded and skipped over (collect mode, the default) or aborts
/// the run (fail-fast mode).
///
/// ```no_run
/// use revflow::pipeline::Pipeline;
/// use revflow::sources::CsvSource;
/// use revflow::transformers::FilterTransformer;
/// use revflow::destinations::JsonDestination;
/// use revflow::types::numeric_field;
///
/// let result = Pipeline::new("High value deals")
///     .add_source(CsvSource::new("deals.csv"))
///     .add_transformer(FilterTransformer::new(|deal| {
///         numeric_field(deal, "amount").unwrap_or(0.0) > 10_000.0
///     }))
///     .add_destination(JsonDestination::new("high_value_deals.json"))
///     .run(None);
/// ```
pub struct Pipeline {
    name: String,
    fail_fast: bool,
    stages: Vec<Stage>,
    hooks: HashMap<HookEvent, Vec<HookFn>>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fail_fast: false,
            stages: Vec::new(),
            hooks: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Abort the run on the first stage failure instead of collecting it.
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Append a stage; stage order is execution order.
    pub fn add_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn add_source(self, source: impl RecordSource + 'static) -> Self {
        self.add_stage(Stage::Source(Box::new(source)))
    }

    pub fn add_transformer(self, transformer: impl Transformer + 'static) -> Self {
        self.add_stage(Stage::Transform(Box::new(transformer)))
    }

    pub fn add_destination(self, destination: impl Destination + 'static) -> Self {
        self.add_stage(Stage::Destination(Box::new(destination)))
    }

    /// Subscribe a callback to one of the four extension points.
    ///
    /// Hooks run synchronously in registration order before the orchestrator
    /// proceeds. They are trusted code: a panicking hook aborts the run.
    pub fn add_hook(
        mut self,
        event: HookEvent,
        callback: impl Fn(&Pipeline, &PipelineContext, Option<&Stage>) + Send + Sync + 'static,
    ) -> Self {
        self.hooks
            .entry(event)
            .or_default()
            .push(Box::new(callback));
        self
    }

    fn fire_hooks(&self, event: HookEvent, context: &PipelineContext, stage: Option<&Stage>) {
        if let Some(callbacks) = self.hooks.get(&event) {
            for callback in callbacks {
                callback(self, context, stage);
            }
        }
    }

    /// Run all stages in order, starting from `initial_data` (or an empty
    /// record set) and returning the final context.
    ///
    /// In collect mode the returned context's `errors` documents every
    /// failure encountered; in fail-fast mode the first failure is returned
    /// as an error after the post-run hooks have fired.
    #[instrument(skip(self, initial_data), fields(pipeline = %self.name))]
    pub fn run(&self, initial_data: Option<RecordSet>) -> Result<PipelineContext> {
        let mut context = PipelineContext::new(initial_data);
        counter!("revflow_pipeline_runs_total", "pipeline" => self.name.clone()).increment(1);
        let run_timer = Instant::now();

        self.fire_hooks(HookEvent::PreRun, &context, None);
        info!("🚀 Starting pipeline: {}", self.name);

        for (i, stage) in self.stages.iter().enumerate() {
            info!("Stage {}/{}: {}", i + 1, self.stages.len(), stage.name());
            self.fire_hooks(HookEvent::PreStage, &context, Some(stage));

            let stage_timer = Instant::now();
            let outcome = match stage {
                Stage::Source(source) => source.fetch().map(Some),
                Stage::Transform(transformer) => transformer.transform(&context.data).map(Some),
                Stage::Destination(destination) => destination.write(&context.data).map(|_| None),
            };

            match outcome {
                Ok(next_data) => {
                    if let Some(data) = next_data {
                        context.data = data;
                    }
                    let elapsed = stage_timer.elapsed();
                    context.mark_stage_complete(stage.name(), elapsed.as_millis() as u64);
                    histogram!("revflow_stage_duration_seconds", "stage" => stage.name().to_string())
                        .record(elapsed.as_secs_f64());
                }
                Err(e) => {
                    error!("Error in stage {}: {}", stage.name(), e);
                    counter!("revflow_stage_errors_total", "stage" => stage.name().to_string())
                        .increment(1);
                    context.add_error(stage.name(), &e);
                    if self.fail_fast {
                        self.fire_hooks(HookEvent::PostRun, &context, None);
                        return Err(RevflowError::Stage {
                            stage: stage.name().to_string(),
                            message: e.to_string(),
                        });
                    }
                }
            }

            self.fire_hooks(HookEvent::PostStage, &context, Some(stage));
        }

        self.fire_hooks(HookEvent::PostRun, &context, None);

        let total_secs = run_timer.elapsed().as_secs_f64();
        histogram!("revflow_pipeline_duration_seconds", "pipeline" => self.name.clone())
            .record(total_secs);
        info!(
            "✅ Pipeline complete: {} records, {} errors in {:.2}s",
            context.data.len(),
            context.errors.len(),
            total_secs
        );

        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RevflowError;
    use crate::types::Record;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedSource {
        records: RecordSet,
    }

    impl RecordSource for FixedSource {
        fn name(&self) -> &str {
            "FixedSource"
        }

        fn fetch(&self) -> Result<RecordSet> {
            Ok(self.records.clone())
        }
    }

    struct IdentityTransformer;

    impl Transformer for IdentityTransformer {
        fn name(&self) -> &str {
            "IdentityTransformer"
        }

        fn transform(&self, data: &[Record]) -> Result<RecordSet> {
            Ok(data.to_vec())
        }
    }

    struct FailingTransformer;

    impl Transformer for FailingTransformer {
        fn name(&self) -> &str {
            "FailingTransformer"
        }

        fn transform(&self, _data: &[Record]) -> Result<RecordSet> {
            Err(RevflowError::MissingField("amount".to_string()))
        }
    }

    struct TaggingTransformer;

    impl Transformer for TaggingTransformer {
        fn name(&self) -> &str {
            "TaggingTransformer"
        }

        fn transform(&self, data: &[Record]) -> Result<RecordSet> {
            Ok(data
                .iter()
                .map(|record| {
                    let mut tagged = record.clone();
                    tagged.insert("tagged".to_string(), json!(true));
                    tagged
                })
                .collect())
        }
    }

    struct NullDestination;

    impl Destination for NullDestination {
        fn name(&self) -> &str {
            "NullDestination"
        }

        fn write(&self, _data: &[Record]) -> Result<()> {
            Ok(())
        }
    }

    fn sample_records() -> RecordSet {
        (1..=3)
            .map(|i| {
                let mut record = Record::new();
                record.insert("id".to_string(), json!(format!("D{i:03}")));
                record.insert("amount".to_string(), json!(i * 1000));
                record
            })
            .collect()
    }

    #[test]
    fn identity_transformer_preserves_data_and_order() {
        let records = sample_records();
        let result = Pipeline::new("identity")
            .add_transformer(IdentityTransformer)
            .run(Some(records.clone()))
            .unwrap();
        assert_eq!(result.data, records);
        assert_eq!(result.metadata["record_count"], json!(3));
    }

    #[test]
    fn collect_mode_records_error_and_continues() {
        let result = Pipeline::new("collect")
            .add_source(FixedSource {
                records: sample_records(),
            })
            .add_transformer(FailingTransformer)
            .add_transformer(TaggingTransformer)
            .run(None)
            .unwrap();

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].stage, "FailingTransformer");
        // The downstream stage ran on the last good data.
        assert_eq!(result.data.len(), 3);
        assert!(result.data.iter().all(|r| r["tagged"] == json!(true)));
        assert_eq!(
            result.stages_completed(),
            vec!["FixedSource", "TaggingTransformer"]
        );
    }

    #[test]
    fn fail_fast_aborts_without_running_later_stages() {
        let post_stage_calls = Arc::new(AtomicUsize::new(0));
        let post_run_calls = Arc::new(AtomicUsize::new(0));
        let stage_counter = post_stage_calls.clone();
        let run_counter = post_run_calls.clone();

        let outcome = Pipeline::new("fail-fast")
            .fail_fast(true)
            .add_source(FixedSource {
                records: sample_records(),
            })
            .add_transformer(FailingTransformer)
            .add_transformer(TaggingTransformer)
            .add_hook(HookEvent::PostStage, move |_, _, _| {
                stage_counter.fetch_add(1, Ordering::SeqCst);
            })
            .add_hook(HookEvent::PostRun, move |_, _, _| {
                run_counter.fetch_add(1, Ordering::SeqCst);
            })
            .run(None);

        match outcome {
            Err(RevflowError::Stage { stage, .. }) => assert_eq!(stage, "FailingTransformer"),
            other => panic!("expected stage failure, got {other:?}"),
        }
        // Only the source's post-stage hook fired before the abort.
        assert_eq!(post_stage_calls.load(Ordering::SeqCst), 1);
        // Post-run hooks fire even after an abort.
        assert_eq!(post_run_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn destination_leaves_data_unchanged() {
        let records = sample_records();
        let result = Pipeline::new("consume")
            .add_destination(NullDestination)
            .run(Some(records.clone()))
            .unwrap();
        assert_eq!(result.data, records);
    }

    #[test]
    fn hooks_fire_in_registration_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let first = order.clone();
        let second = order.clone();

        Pipeline::new("hooks")
            .add_transformer(IdentityTransformer)
            .add_hook(HookEvent::PreRun, move |_, _, _| {
                first.lock().unwrap().push("first");
            })
            .add_hook(HookEvent::PreRun, move |_, _, _| {
                second.lock().unwrap().push("second");
            })
            .run(None)
            .unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn hook_event_parses_only_the_four_fixed_names() {
        assert_eq!("pre_run".parse::<HookEvent>().unwrap(), HookEvent::PreRun);
        assert_eq!(
            "post_stage".parse::<HookEvent>().unwrap(),
            HookEvent::PostStage
        );
        assert!(matches!(
            "on_error".parse::<HookEvent>(),
            Err(RevflowError::Config(_))
        ));
    }

    #[test]
    fn pre_stage_hooks_see_the_stage() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();

        Pipeline::new("stage-names")
            .add_transformer(IdentityTransformer)
            .add_hook(HookEvent::PreStage, move |_, _, stage| {
                sink.lock()
                    .unwrap()
                    .push(stage.map(|s| s.name().to_string()));
            })
            .run(None)
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some("IdentityTransformer".to_string())]
        );
    }
}
