//! Counter - tracked state, events and async builds against a `MemoryDom`.
//!
//! Run with: RUST_LOG=spark_dom=debug cargo run --example counter

use spark_dom::*;
use tracing_subscriber::EnvFilter;

fn counter() -> Component {
    component("Counter", |ctx, props| {
        let state = ctx.use_reactive(|| RawObject::from_pairs([("count", 0)]));
        let step = props.get("step").as_number().unwrap_or(1.0);
        let count = state.get("count").as_number().unwrap_or(0.0);

        let inc = state.clone();
        let reset = state.clone();
        Ok(h(
            "div",
            Props::new().with("className", "counter"),
            [
                h("span", Props::new(), [text(format!("Count: {count}"))]),
                h(
                    "button",
                    Props::new().on("click", move |_| {
                        let current = inc.get("count").as_number().unwrap_or(0.0);
                        inc.set("count", current + step).ok();
                    }),
                    [text("+")],
                ),
                h(
                    "button",
                    Props::new().on("click", move |_| {
                        reset.set("count", 0).ok();
                    }),
                    [text("reset")],
                ),
            ],
        ))
    })
}

fn main() -> Result<(), BuildError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    set_runtime_config(RuntimeConfig::from_env());

    let dom = MemoryDom::new();
    let container = dom.create_container("div");
    let root = create_root(dom.clone(), container);

    root.render(counter().element(Props::new().with("step", 2)))?;
    println!("{}", dom.inner_html(container));

    let buttons = dom.find_all(container, "button");
    for _ in 0..3 {
        root.dispatch_event(buttons[0], "click", Value::Undefined)?;
    }
    println!("{}", dom.inner_html(container));

    root.dispatch_event(buttons[1], "click", Value::Undefined)?;
    println!("{}", dom.inner_html(container));

    let stats = root.stats();
    println!(
        "builds={} commits={} host_ops={}",
        stats.builds, stats.commits, stats.host_operations
    );
    root.unmount()
}
