#![forbid(unsafe_code)]

//! Tracing span instrumentation tests.
//!
//! Spans enabled:
//!   cargo test -p ftui-tree --features tracing --test tracing_tests
//!
//! Without the feature the same operations must run and emit nothing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ftui_tree::{FlexTreeModel, IndexTreeModel, SpliceHooks, TreeElement, TreeOptions};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;

// ============================================================================
// Test Infrastructure
// ============================================================================

/// A captured span with its fields and parent.
#[derive(Debug, Clone)]
#[allow(dead_code)]
struct CapturedSpan {
    name: String,
    fields: HashMap<String, String>,
    parent_name: Option<String>,
}

/// A tracing Layer that captures span metadata.
struct SpanCapture {
    spans: Arc<Mutex<Vec<CapturedSpan>>>,
}

/// Visitor that extracts span fields.
struct FieldVisitor(Vec<(String, String)>);

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0
            .push((field.name().to_string(), format!("{value:?}")));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.push((field.name().to_string(), value.to_string()));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.push((field.name().to_string(), value.to_string()));
    }
}

impl<S> tracing_subscriber::Layer<S> for SpanCapture
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        _id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let mut visitor = FieldVisitor(Vec::new());
        attrs.record(&mut visitor);

        let parent_name = ctx
            .current_span()
            .id()
            .and_then(|id| ctx.span(id))
            .map(|span_ref| span_ref.name().to_string());

        self.spans.lock().unwrap().push(CapturedSpan {
            name: attrs.metadata().name().to_string(),
            fields: visitor.0.into_iter().collect(),
            parent_name,
        });
    }
}

/// Run `f` under a subscriber that records every span created.
fn with_captured_spans<F>(f: F) -> Vec<CapturedSpan>
where
    F: FnOnce(),
{
    let spans = Arc::new(Mutex::new(Vec::new()));
    let layer = SpanCapture {
        spans: spans.clone(),
    };
    let subscriber = tracing_subscriber::registry().with(layer);
    tracing::subscriber::with_default(subscriber, f);
    let captured = spans.lock().unwrap().clone();
    captured
}

fn exercise_index_model() {
    let mut tree: IndexTreeModel<u32> = IndexTreeModel::new(0, Vec::new(), TreeOptions::new());
    tree.splice(
        &[0],
        0,
        vec![
            TreeElement::new(1).child(TreeElement::new(2)),
            TreeElement::new(3).with_collapsed(true).child(TreeElement::new(4)),
        ],
        SpliceHooks::none(),
    )
    .unwrap();
    tree.set_collapsed(&[0], Some(true), false).unwrap();
    tree.expand_to(&[1, 0]).unwrap();
    tree.filter(false).unwrap();
}

// ============================================================================
// Tests
// ============================================================================

#[test]
#[cfg(feature = "tracing")]
fn spans_created_for_structural_operations() {
    let spans = with_captured_spans(exercise_index_model);
    let names: Vec<&str> = spans.iter().map(|s| s.name.as_str()).collect();
    for expected in ["tree_splice", "tree_set_collapsed", "tree_expand_to", "tree_filter"] {
        assert!(names.contains(&expected), "missing span {expected}: {names:?}");
    }
}

#[test]
#[cfg(feature = "tracing")]
fn splice_span_records_range() {
    let spans = with_captured_spans(exercise_index_model);
    let splice = spans
        .iter()
        .find(|s| s.name == "tree_splice")
        .expect("splice span");
    assert_eq!(splice.fields.get("start").map(String::as_str), Some("0"));
    assert_eq!(splice.fields.get("delete_count").map(String::as_str), Some("0"));
    assert_eq!(splice.fields.get("parent").map(String::as_str), Some("#1"));
}

#[test]
#[cfg(feature = "tracing")]
fn collapse_span_records_request() {
    let spans = with_captured_spans(exercise_index_model);
    let collapse = spans
        .iter()
        .find(|s| s.name == "tree_set_collapsed")
        .expect("collapse span");
    assert_eq!(collapse.fields.get("collapsed").map(String::as_str), Some("true"));
    assert_eq!(collapse.fields.get("recursive").map(String::as_str), Some("false"));
}

#[test]
#[cfg(feature = "tracing")]
fn refresh_span_created() {
    let spans = with_captured_spans(|| {
        let mut tree: FlexTreeModel<u32> = FlexTreeModel::new(0, Vec::new(), TreeOptions::new());
        let root = tree.root();
        tree.edit(root)
            .unwrap()
            .push_new(TreeElement::new(1))
            .unwrap();
        tree.refresh(root, SpliceHooks::none()).unwrap();
    });
    assert!(spans.iter().any(|s| s.name == "tree_refresh"));
}

#[test]
fn zero_overhead_without_feature() {
    let spans = with_captured_spans(exercise_index_model);
    if cfg!(feature = "tracing") {
        assert!(!spans.is_empty());
    } else {
        assert!(spans.is_empty(), "unexpected spans: {spans:?}");
    }
}
