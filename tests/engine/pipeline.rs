//! Integration tests for refinement pipelines
//!
//! Runs pipelines directly against a small in-memory concept.

use std::time::Duration;

use async_trait::async_trait;
use syncline_engine::{
    Concept, ConceptRegistry, EngineConfig, Frame, FrameSet, Pipeline, Query, RefineContext,
    Refinement, Variable, var,
};
use syncline_foundation::{Error, Fields, Name, Result, Value};
use syncline_log::{FlowId, Outcome};

/// `Library.books { author }` answers one tuple per book; `Library.slow`
/// sleeps first.
struct Library;

fn tuple(pairs: &[(&str, Value)]) -> Fields {
    pairs
        .iter()
        .map(|(k, v)| (Name::from(*k), v.clone()))
        .collect()
}

#[async_trait]
impl Concept for Library {
    fn name(&self) -> &str {
        "Library"
    }

    async fn invoke(&self, _action: &str, inputs: Fields) -> Result<Outcome> {
        Ok(Outcome::Success(inputs))
    }

    async fn query(&self, query: &str, inputs: Fields) -> Result<Vec<Fields>> {
        let author = inputs.get("author").and_then(Value::as_str).unwrap_or_default();
        match query {
            "books" => Ok(match author {
                "le guin" => vec![
                    tuple(&[("title", Value::from("Earthsea")), ("year", Value::Int(1968))]),
                    tuple(&[("title", Value::from("The Dispossessed")), ("year", Value::Int(1974))]),
                ],
                "herbert" => vec![tuple(&[("title", Value::from("Dune")), ("year", Value::Int(1965))])],
                _ => Vec::new(),
            }),
            "slow" => {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(Vec::new())
            }
            _ => Err(Error::query_failed("Library", query, "no such query")),
        }
    }
}

fn registry() -> ConceptRegistry {
    let mut concepts = ConceptRegistry::new();
    concepts.register(Library).unwrap();
    concepts
}

fn authors(names: &[&str]) -> FrameSet {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            Frame::new(FlowId::new(i as u64 + 1))
                .bind(var("a"), Value::from(*name))
                .unwrap()
        })
        .collect()
}

fn books() -> Query {
    Query::new("Library", "books")
        .input("author", var("a"))
        .output("title", var("t"))
        .output("year", var("y"))
}

async fn run(pipeline: &Pipeline, frames: FrameSet, config: &EngineConfig) -> syncline_engine::Refined {
    let concepts = registry();
    let ctx = RefineContext {
        concepts: &concepts,
        config,
        rule: "test",
    };
    pipeline.run(frames, &ctx).await
}

fn titles(frames: &FrameSet) -> Vec<String> {
    frames
        .iter()
        .filter_map(|f| f.get("t").and_then(Value::as_str).map(ToString::to_string))
        .collect()
}

// =============================================================================
// Query, Filter, Map
// =============================================================================

#[tokio::test]
async fn query_fans_out_in_frame_order() {
    let pipeline = Pipeline::new().query(books());
    let refined = run(&pipeline, authors(&["le guin", "nobody", "herbert"]), &EngineConfig::default()).await;

    assert_eq!(titles(&refined.frames), vec!["Earthsea", "The Dispossessed", "Dune"]);
    assert!(refined.faults.is_empty());
    // Lineage follows the frame each tuple was joined into.
    let lineages: Vec<_> = refined.frames.iter().map(Frame::lineage).collect();
    assert_eq!(lineages, vec![FlowId::new(1), FlowId::new(1), FlowId::new(3)]);
}

#[tokio::test]
async fn filter_and_map_narrow_and_extend() {
    let pipeline = Pipeline::new()
        .query(books())
        .filter(&["y"], |f| f.get("y").and_then(Value::as_int) > Some(1966))
        .map("decade", &["y"], |f| {
            let year = f.get("y").and_then(Value::as_int).unwrap_or_default();
            Value::Int(year / 10 * 10)
        });
    let refined = run(&pipeline, authors(&["le guin", "herbert"]), &EngineConfig::default()).await;

    let decades: Vec<_> = refined.frames.iter().filter_map(|f| f.get("decade").cloned()).collect();
    assert_eq!(decades, vec![Value::Int(1960), Value::Int(1970)]);
}

#[tokio::test]
async fn empty_stage_short_circuits_silently() {
    let pipeline = Pipeline::new()
        .query(books())
        .query(Query::new("Library", "unknown").input("author", var("a")));
    let refined = run(&pipeline, authors(&["nobody"]), &EngineConfig::default()).await;

    assert!(refined.frames.is_empty());
    assert!(refined.faults.is_empty());
}

// =============================================================================
// Faults
// =============================================================================

#[tokio::test]
async fn query_timeout_is_a_fault_for_that_frame() {
    let config = EngineConfig::default().with_query_timeout(Duration::from_millis(10));
    let pipeline = Pipeline::new().query(Query::new("Library", "slow").input("author", var("a")));
    let refined = run(&pipeline, authors(&["x"]), &config).await;

    assert!(refined.frames.is_empty());
    assert_eq!(refined.faults.len(), 1);
    assert_eq!(refined.faults[0].stage, "query Library.slow");
    assert!(refined.faults[0].to_string().contains("timed out"));
}

// =============================================================================
// Aggregation
// =============================================================================

#[tokio::test]
async fn collect_gathers_titles_per_author() {
    let pipeline = Pipeline::new().query(books()).collect(&["t", "y"], "works");
    let refined = run(&pipeline, authors(&["le guin", "herbert"]), &EngineConfig::default()).await;

    assert_eq!(refined.frames.len(), 2);
    let first = refined.frames.iter().next().unwrap();
    let works = first.get("works").and_then(Value::as_list).unwrap();
    assert_eq!(works.len(), 2);
    assert_eq!(
        works.first().unwrap().field("t").unwrap().as_str(),
        Some("Earthsea")
    );
}

#[tokio::test]
async fn gather_keeps_frames_with_no_results() {
    let pipeline = Pipeline::new().gather(Pipeline::new().query(books()), &["t"], "titles");
    let refined = run(&pipeline, authors(&["nobody", "herbert"]), &EngineConfig::default()).await;

    let lists: Vec<_> = refined.frames.iter().filter_map(|f| f.get("titles").cloned()).collect();
    assert_eq!(lists, vec![Value::list(Vec::<Value>::new()), Value::list(["Dune"])]);
}

// =============================================================================
// Custom Stages
// =============================================================================

/// Keeps only the first frame.
struct FirstOnly;

#[async_trait]
impl Refinement for FirstOnly {
    fn name(&self) -> &str {
        "first-only"
    }

    fn reads(&self) -> Vec<Variable> {
        vec![var("t")]
    }

    async fn refine(&self, frames: FrameSet, _ctx: &RefineContext<'_>) -> Result<FrameSet> {
        Ok(frames.into_iter().take(1).collect())
    }
}

#[tokio::test]
async fn custom_refinement_sees_the_whole_set() {
    let pipeline = Pipeline::new().query(books()).refine(FirstOnly);
    let refined = run(&pipeline, authors(&["le guin"]), &EngineConfig::default()).await;

    assert_eq!(titles(&refined.frames), vec!["Earthsea"]);
}
