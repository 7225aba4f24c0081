//! End-to-end rendering through a `MemoryDom`.
//!
//! Covers the state → build → commit loop:
//! - tracked writes re-render once, same-value writes not at all
//! - keyed reorders move host nodes instead of recreating them
//! - direct text and child lists replace each other
//! - SVG namespaces, memo bailouts, class lifecycles, update loops
//! - async slicing, yielding and aborting

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use spark_dom::*;

// =============================================================================
// Helpers
// =============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup(mode: ScheduleMode) -> (MemoryDom, DomNode, Root) {
    init_tracing();
    set_runtime_config(RuntimeConfig {
        default_mode: mode,
        ..RuntimeConfig::default()
    });
    let dom = MemoryDom::new();
    let container = dom.create_container("div");
    let root = create_root(dom.clone(), container);
    (dom, container, root)
}

fn list(keys: &[&str]) -> Element {
    h(
        "ul",
        Props::new(),
        keys.iter().map(|k| h("li", Props::new(), [text(*k)]).with_key(k)),
    )
}

// =============================================================================
// Counter
// =============================================================================

#[test]
fn test_counter_rebuilds_once_per_change() {
    let (dom, container, root) = setup(ScheduleMode::Async);
    let slot: Rc<RefCell<Option<Proxy>>> = Rc::new(RefCell::new(None));
    let exposed = slot.clone();
    let counter = component("Counter", move |ctx, _props| {
        let state = ctx.use_reactive(|| RawObject::from_pairs([("count", 0)]));
        *exposed.borrow_mut() = Some(state.clone());
        Ok(h("p", Props::new(), [text(format!("Count: {}", state.get("count")))]))
    });

    root.render(counter.element(Props::new())).unwrap();
    assert_eq!(dom.inner_html(container), "<p>Count: 0</p>");
    let builds = root.stats().builds;
    let state = slot.borrow().clone().unwrap();

    state.set("count", 1).unwrap();
    // Async: nothing happens until the queue runs
    assert_eq!(dom.inner_html(container), "<p>Count: 0</p>");
    run_deferred();
    assert_eq!(dom.inner_html(container), "<p>Count: 1</p>");
    assert_eq!(root.stats().builds, builds + 1);

    // Same value: no notification, no build, no host work
    dom.take_ops();
    state.set("count", 1).unwrap();
    run_deferred();
    assert_eq!(dom.mutation_count(), 0);
    assert_eq!(root.stats().builds, builds + 1);
}

#[test]
fn test_sync_mode_commits_before_set_returns() {
    let (dom, container, root) = setup(ScheduleMode::Sync);
    let slot: Rc<RefCell<Option<Proxy>>> = Rc::new(RefCell::new(None));
    let exposed = slot.clone();
    let label = component("Label", move |ctx, _props| {
        let state = ctx.use_reactive(|| RawObject::from_pairs([("name", "a")]));
        *exposed.borrow_mut() = Some(state.clone());
        Ok(text(state.get("name").to_string()))
    });

    root.render(label.element(Props::new())).unwrap();
    let state = slot.borrow().clone().unwrap();
    state.set("name", "b").unwrap();
    assert_eq!(dom.inner_html(container), "b");
    assert!(!has_pending_work());
}

#[test]
fn test_unread_key_does_not_rebuild() {
    let (_dom, _container, root) = setup(ScheduleMode::Sync);
    let slot: Rc<RefCell<Option<Proxy>>> = Rc::new(RefCell::new(None));
    let exposed = slot.clone();
    let view = component("View", move |ctx, _props| {
        let state = ctx.use_reactive(|| RawObject::from_pairs([("shown", 1), ("hidden", 2)]));
        *exposed.borrow_mut() = Some(state.clone());
        Ok(text(state.get("shown").to_string()))
    });

    root.render(view.element(Props::new())).unwrap();
    let builds = root.stats().builds;
    slot.borrow().as_ref().unwrap().set("hidden", 3).unwrap();
    assert_eq!(root.stats().builds, builds);
}

// =============================================================================
// Reconciliation
// =============================================================================

#[test]
fn test_keyed_reorder_moves_existing_nodes() {
    let (dom, container, root) = setup(ScheduleMode::Sync);
    root.render(list(&["a", "b", "c"])).unwrap();
    let before = dom.find_all(container, "li");
    assert_eq!(before.len(), 3);

    dom.take_ops();
    root.render(list(&["c", "a", "b"])).unwrap();
    let after = dom.find_all(container, "li");
    assert_eq!(after, vec![before[2], before[0], before[1]]);
    assert_eq!(dom.text_content(container), "cab");
    assert!(
        !dom.ops()
            .iter()
            .any(|op| matches!(op, DomOp::CreateElement { .. } | DomOp::Remove { .. }))
    );
}

#[test]
fn test_keyed_insert_and_remove() {
    let (dom, container, root) = setup(ScheduleMode::Sync);
    root.render(list(&["a", "b", "c"])).unwrap();
    let before = dom.find_all(container, "li");

    root.render(list(&["a", "x", "c"])).unwrap();
    let after = dom.find_all(container, "li");
    assert_eq!(dom.text_content(container), "axc");
    assert_eq!(after[0], before[0]);
    assert_eq!(after[2], before[2]);
    assert!(!after.contains(&before[1]));
}

#[test]
fn test_type_change_replaces_node() {
    let (dom, container, root) = setup(ScheduleMode::Sync);
    root.render(h("div", Props::new(), [h("span", Props::new(), [text("x")])]))
        .unwrap();
    let span = dom.find_all(container, "span")[0];

    root.render(h("div", Props::new(), [h("b", Props::new(), [text("x")])]))
        .unwrap();
    assert_eq!(dom.inner_html(container), "<div><b>x</b></div>");
    assert_eq!(dom.parent(span), None);
}

#[test]
fn test_direct_text_and_children_swap() {
    let (dom, container, root) = setup(ScheduleMode::Sync);
    root.render(h("p", Props::new(), [text("plain")])).unwrap();
    assert_eq!(dom.inner_html(container), "<p>plain</p>");

    root.render(h("p", Props::new(), [h("b", Props::new(), [text("bold")])]))
        .unwrap();
    assert_eq!(dom.inner_html(container), "<p><b>bold</b></p>");

    root.render(h("p", Props::new(), [text("again")])).unwrap();
    assert_eq!(dom.inner_html(container), "<p>again</p>");
}

#[test]
fn test_prop_update_and_removal() {
    let (dom, container, root) = setup(ScheduleMode::Sync);
    root.render(h("div", Props::new().with("className", "a").with("data-id", 7), []))
        .unwrap();
    let div = dom.children(container)[0];
    assert_eq!(dom.attribute(div, "data-id").as_deref(), Some("7"));

    root.render(h("div", Props::new().with("className", "b"), [])).unwrap();
    assert_eq!(dom.inner_html(container), "<div class=\"b\"></div>");
    assert_eq!(dom.attribute(div, "data-id"), None);
}

#[test]
fn test_svg_namespace() {
    let (dom, container, root) = setup(ScheduleMode::Sync);
    root.render(h(
        "div",
        Props::new(),
        [
            h("svg", Props::new(), [h("circle", Props::new().with("r", 5), [])]),
            h("span", Props::new(), []),
        ],
    ))
    .unwrap();

    let svg = dom.find_all(container, "svg")[0];
    let circle = dom.find_all(container, "circle")[0];
    let span = dom.find_all(container, "span")[0];
    assert_eq!(dom.namespace(svg), Some(Namespace::Svg));
    assert_eq!(dom.namespace(circle), Some(Namespace::Svg));
    assert_eq!(dom.namespace(span), Some(Namespace::Html));
    assert_eq!(dom.attribute(circle, "r").as_deref(), Some("5"));
}

#[test]
fn test_fragment_children_are_placed_in_order() {
    let (dom, container, root) = setup(ScheduleMode::Sync);
    root.render(fragment([text("a"), h("i", Props::new(), []), text("b")]))
        .unwrap();
    assert_eq!(dom.inner_html(container), "a<i></i>b");
}

#[test]
fn test_node_ref_attached_and_cleared() {
    let (dom, container, root) = setup(ScheduleMode::Sync);
    let node_ref = NodeRef::new();
    root.render(h("input", Props::new(), []).with_ref(&node_ref)).unwrap();
    assert_eq!(node_ref.get(), Some(dom.children(container)[0]));

    root.render(empty()).unwrap();
    assert_eq!(node_ref.get(), None);
}

// =============================================================================
// Memo
// =============================================================================

#[test]
fn test_memo_skips_equal_props() {
    let (dom, container, root) = setup(ScheduleMode::Sync);
    let renders = Rc::new(Cell::new(0));
    let counted = renders.clone();
    let child = component("Child", move |_ctx, props| {
        counted.set(counted.get() + 1);
        Ok(h("b", Props::new(), [text(props.get("label").to_string())]))
    });

    let slot: Rc<RefCell<Option<Proxy>>> = Rc::new(RefCell::new(None));
    let exposed = slot.clone();
    let parent = component("Parent", move |ctx, _props| {
        let state = ctx.use_reactive(|| RawObject::from_pairs([("ticks", Value::from(0)), ("label", Value::from("x"))]));
        *exposed.borrow_mut() = Some(state.clone());
        Ok(fragment([
            text(state.get("ticks").to_string()),
            memo(&child, Props::new().with("label", state.get("label"))),
        ]))
    });

    root.render(parent.element(Props::new())).unwrap();
    assert_eq!(renders.get(), 1);
    let state = slot.borrow().clone().unwrap();

    state.set("ticks", 1).unwrap();
    assert_eq!(dom.inner_html(container), "1<b>x</b>");
    assert_eq!(renders.get(), 1);

    state.set("label", "y").unwrap();
    assert_eq!(dom.inner_html(container), "1<b>y</b>");
    assert_eq!(renders.get(), 2);
}

#[test]
fn test_memo_with_custom_compare() {
    let (_dom, _container, root) = setup(ScheduleMode::Sync);
    let renders = Rc::new(Cell::new(0));
    let counted = renders.clone();
    let child = component("Always", move |_ctx, _props| {
        counted.set(counted.get() + 1);
        Ok(empty())
    });
    let never_equal = |_: &Props, _: &Props| false;

    root.render(memo_with(&child, Props::new(), never_equal)).unwrap();
    root.render(memo_with(&child, Props::new(), never_equal)).unwrap();
    assert_eq!(renders.get(), 2);
}

// =============================================================================
// Class components
// =============================================================================

thread_local! {
    static LOG: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    static UPDATER: RefCell<Option<Updater>> = const { RefCell::new(None) };
}

fn log(entry: impl Into<String>) {
    LOG.with(|l| l.borrow_mut().push(entry.into()));
}

fn take_log() -> Vec<String> {
    LOG.with(|l| std::mem::take(&mut *l.borrow_mut()))
}

struct Tally;

impl ClassComponent for Tally {
    fn new(_props: &Props) -> Self {
        Tally
    }

    fn initial_state(&self, _props: &Props) -> Value {
        Value::object([("n", 0)])
    }

    fn render(&self, ctx: &ClassCtx<'_>) -> Render {
        UPDATER.with(|u| *u.borrow_mut() = Some(ctx.updater.clone()));
        Ok(h("span", Props::new(), [text(ctx.field("n").to_string())]))
    }

    fn should_component_update(&self, _next_props: &Props, next_state: &Value) -> bool {
        next_state.as_raw().map(|s| s.field("skip")).is_none_or(|skip| !skip.truthy())
    }

    fn component_did_mount(&self, _updater: &Updater) {
        log("mount");
    }

    fn component_did_update(&self, _prev_props: &Props, prev_state: &Value, _updater: &Updater) {
        let prev = prev_state.as_raw().map(|s| s.field("n")).unwrap_or_default();
        log(format!("update from {prev}"));
    }

    fn component_will_unmount(&self) {
        log("unmount");
    }
}

fn updater() -> Updater {
    UPDATER.with(|u| u.borrow().clone()).unwrap()
}

#[test]
fn test_class_lifecycle_and_fifo_updates() {
    let (dom, container, root) = setup(ScheduleMode::Sync);
    root.render(class::<Tally>(Props::new())).unwrap();
    assert_eq!(dom.inner_html(container), "<span>0</span>");
    assert_eq!(take_log(), vec!["mount"]);

    let builds = root.stats().builds;
    let up = updater();
    batch(|| {
        up.set_state(Value::object([("n", 1)]));
        up.set_state_with(|state, _props| {
            let n = state.as_raw().map(|s| s.field("n")).unwrap_or_default();
            Value::object([("n", n.as_number().unwrap_or(0.0) + 1.0)])
        });
        up.set_state_then(Value::Undefined, || log("callback"));
    });
    // One build folds all three, in order
    assert_eq!(root.stats().builds, builds + 1);
    assert_eq!(dom.inner_html(container), "<span>2</span>");
    assert_eq!(take_log(), vec!["update from 0", "callback"]);

    root.render(empty()).unwrap();
    assert_eq!(take_log(), vec!["unmount"]);
    assert!(!updater().is_mounted());
}

#[test]
fn test_should_component_update_skips_render() {
    let (dom, container, root) = setup(ScheduleMode::Sync);
    root.render(class::<Tally>(Props::new())).unwrap();
    take_log();

    updater().set_state(Value::object([("n", Value::from(5)), ("skip", Value::from(true))]));
    assert_eq!(dom.inner_html(container), "<span>0</span>");
    assert!(take_log().is_empty());

    updater().force_update();
    assert_eq!(dom.inner_html(container), "<span>5</span>");
}

// =============================================================================
// Effects and update loops
// =============================================================================

#[test]
fn test_use_effect_runs_after_commit_and_cleans_up() {
    let (_dom, _container, root) = setup(ScheduleMode::Sync);
    let events = Rc::new(RefCell::new(Vec::new()));
    let seen = events.clone();
    let probe = component("Probe", move |ctx, props| {
        let id = props.get("id");
        let seen = seen.clone();
        ctx.use_effect(Some(&[id.clone()]), move || {
            seen.borrow_mut().push(format!("run {id}"));
            let seen = seen.clone();
            let cleanup: Cleanup = Box::new(move || seen.borrow_mut().push(format!("clean {id}")));
            Some(cleanup)
        });
        Ok(empty())
    });

    root.render(probe.element(Props::new().with("id", 1))).unwrap();
    root.render(probe.element(Props::new().with("id", 1))).unwrap();
    root.render(probe.element(Props::new().with("id", 2))).unwrap();
    root.render(empty()).unwrap();
    assert_eq!(*events.borrow(), vec!["run 1", "clean 1", "run 2", "clean 2"]);
}

#[test]
fn test_effect_feedback_is_an_update_loop() {
    let (_dom, _container, root) = setup(ScheduleMode::Sync);
    update_runtime_config(|c| c.max_nested_builds = 5);
    let runaway = component("Runaway", |ctx, _props| {
        let state = ctx.use_reactive(|| RawObject::from_pairs([("n", 0)]));
        let n = state.get("n").as_number().unwrap_or(0.0);
        ctx.use_effect(None, move || {
            state.set("n", n + 1.0).ok();
            None
        });
        Ok(text(n.to_string()))
    });

    let err = root.render(runaway.element(Props::new())).unwrap_err();
    assert!(matches!(err, BuildError::UpdateLoop { passes: 5 }));
}

// =============================================================================
// Async slicing
// =============================================================================

#[test]
fn test_async_build_yields_between_slices() {
    let (dom, container, root) = setup(ScheduleMode::Async);
    update_runtime_config(|c| c.slice_budget = 2);
    let keys: Vec<String> = (0..10).map(|i| i.to_string()).collect();
    let keys: Vec<&str> = keys.iter().map(String::as_str).collect();

    root.render_with(list(&keys), ScheduleMode::Async).unwrap();
    assert!(tick());
    // One slice in: nothing committed yet
    assert_eq!(dom.inner_html(container), "");
    assert!(root.stats().yields >= 1);

    run_deferred();
    assert_eq!(dom.find_all(container, "li").len(), 10);
    assert_eq!(root.stats().commits, 1);
}

#[test]
fn test_sync_render_aborts_in_flight_async_build() {
    let (dom, container, root) = setup(ScheduleMode::Async);
    update_runtime_config(|c| c.slice_budget = 1);

    root.render_with(list(&["a", "b", "c"]), ScheduleMode::Async).unwrap();
    assert!(tick());
    root.render(list(&["z"])).unwrap();
    assert_eq!(dom.inner_html(container), "<ul><li>z</li></ul>");
    assert_eq!(root.stats().aborted, 1);

    // The stale slice finds nothing left to do
    run_deferred();
    assert_eq!(dom.inner_html(container), "<ul><li>z</li></ul>");
}
