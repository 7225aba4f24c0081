//! Elements - Immutable descriptions of what to render.
//!
//! A render returns an [`Element`] tree; the builder reconciles it against
//! the VNode tree. Elements are cheap to clone (props and children sit
//! behind `Rc`).
//!
//! # Example
//!
//! ```ignore
//! use spark_dom::element::{h, text, Props};
//!
//! let view = h(
//!     "button",
//!     Props::new().with("className", "primary").on("click", |_| println!("hi")),
//!     [text("Click me")],
//! );
//! ```

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::component::{ClassComponent, ClassType, Component, Lazy};
use crate::dom::DomNode;
use crate::error::Interrupt;
use crate::event::SyntheticEvent;
use crate::reactive::Value;

/// What a component render returns.
pub type Render = Result<Element, Interrupt>;

/// Reconciliation key.
pub type Key = Rc<str>;

/// Event callback stored in props.
pub type EventCallback = Rc<dyn Fn(&mut SyntheticEvent)>;

// =============================================================================
// Props
// =============================================================================

/// Event handler prop.
#[derive(Clone)]
pub struct Handler {
    pub event: Rc<str>,
    pub capture: bool,
    pub callback: EventCallback,
}

#[derive(Clone)]
pub enum Prop {
    Value(Value),
    Handler(Handler),
}

impl Prop {
    fn same(&self, other: &Prop) -> bool {
        match (self, other) {
            (Prop::Value(a), Prop::Value(b)) => a == b,
            (Prop::Handler(a), Prop::Handler(b)) => Rc::ptr_eq(&a.callback, &b.callback),
            _ => false,
        }
    }
}

#[derive(Clone, Default)]
struct PropsInner {
    entries: Vec<(Rc<str>, Prop)>,
    children: Vec<Element>,
}

/// Element props: named values, event handlers and children.
///
/// Handlers live under `on:<event>` / `on:<event>:capture`; they are
/// dispatched by the root and never written to the host node.
#[derive(Clone, Default)]
pub struct Props(Rc<PropsInner>);

fn handler_key(event: &str, capture: bool) -> String {
    if capture { format!("on:{event}:capture") } else { format!("on:{event}") }
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, key: Rc<str>, prop: Prop) {
        let inner = Rc::make_mut(&mut self.0);
        match inner.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = prop,
            None => inner.entries.push((key, prop)),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key.into(), Prop::Value(value.into()));
        self
    }

    /// Bubble-phase handler for `event`.
    pub fn on(mut self, event: &str, callback: impl Fn(&mut SyntheticEvent) + 'static) -> Self {
        self.insert(
            handler_key(event, false).into(),
            Prop::Handler(Handler {
                event: event.into(),
                capture: false,
                callback: Rc::new(callback),
            }),
        );
        self
    }

    /// Capture-phase handler for `event`.
    pub fn on_capture(mut self, event: &str, callback: impl Fn(&mut SyntheticEvent) + 'static) -> Self {
        self.insert(
            handler_key(event, true).into(),
            Prop::Handler(Handler {
                event: event.into(),
                capture: true,
                callback: Rc::new(callback),
            }),
        );
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        Rc::make_mut(&mut self.0).children = children.into_iter().collect();
        self
    }

    pub fn child(mut self, child: Element) -> Self {
        Rc::make_mut(&mut self.0).children.push(child);
        self
    }

    /// Value prop, `Undefined` when missing.
    pub fn get(&self, key: &str) -> Value {
        self.value(key).cloned().unwrap_or_default()
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.0.entries.iter().find_map(|(k, p)| match p {
            Prop::Value(v) if &**k == key => Some(v),
            _ => None,
        })
    }

    pub fn handler(&self, event: &str, capture: bool) -> Option<&Handler> {
        self.0.entries.iter().find_map(|(_, p)| match p {
            Prop::Handler(h) if &*h.event == event && h.capture == capture => Some(h),
            _ => None,
        })
    }

    pub fn handlers(&self) -> impl Iterator<Item = &Handler> {
        self.0.entries.iter().filter_map(|(_, p)| match p {
            Prop::Handler(h) => Some(h),
            Prop::Value(_) => None,
        })
    }

    /// Value props in insertion order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.entries.iter().filter_map(|(k, p)| match p {
            Prop::Value(v) => Some((&**k, v)),
            Prop::Handler(_) => None,
        })
    }

    pub fn children(&self) -> &[Element] {
        &self.0.children
    }

    pub fn len(&self) -> usize {
        self.0.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.entries.is_empty() && self.0.children.is_empty()
    }

    pub fn ptr_eq(&self, other: &Props) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Same entries (by `is_same` / handler identity) and the same children
    /// allocation.
    pub fn shallow_eq(&self, other: &Props) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let (a, b) = (&self.0, &other.0);
        a.entries.len() == b.entries.len()
            && a.entries.iter().all(|(key, prop)| {
                b.entries.iter().any(|(k, p)| k == key && prop.same(p))
            })
            && a.children.len() == b.children.len()
            && a.children.iter().zip(&b.children).all(|(x, y)| x.same_description(y))
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, prop) in &self.0.entries {
            match prop {
                Prop::Value(v) => map.entry(key, v),
                Prop::Handler(_) => map.entry(key, &"<handler>"),
            };
        }
        if !self.0.children.is_empty() {
            map.entry(&"children", &self.0.children.len());
        }
        map.finish()
    }
}

// =============================================================================
// Refs
// =============================================================================

/// Receives the host node of the element it is attached to.
///
/// Set during commit after mount, cleared on unmount.
#[derive(Clone, Default)]
pub struct NodeRef(Rc<Cell<Option<DomNode>>>);

impl NodeRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<DomNode> {
        self.0.get()
    }

    pub(crate) fn set(&self, node: Option<DomNode>) {
        self.0.set(node);
    }

    pub fn ptr_eq(&self, other: &NodeRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeRef({:?})", self.0.get())
    }
}

// =============================================================================
// Context
// =============================================================================

thread_local! {
    static NEXT_CONTEXT_ID: Cell<u64> = const { Cell::new(1) };
}

struct ContextInner {
    id: u64,
    default: Value,
}

/// A value passed down the tree without props.
#[derive(Clone)]
pub struct Context(Rc<ContextInner>);

/// Create a context whose consumers see `default` outside any provider.
pub fn create_context(default: impl Into<Value>) -> Context {
    let id = NEXT_CONTEXT_ID.with(|next| {
        let id = next.get();
        next.set(id + 1);
        id
    });
    Context(Rc::new(ContextInner {
        id,
        default: default.into(),
    }))
}

impl Context {
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn default_value(&self) -> &Value {
        &self.0.default
    }

    pub fn provider(&self, value: impl Into<Value>, children: impl IntoIterator<Item = Element>) -> Element {
        Element::new(ElementKind::Provider {
            context: self.clone(),
            value: value.into(),
            children: Rc::new(children.into_iter().collect()),
        })
    }

    pub fn consumer(&self, render: impl Fn(&Value) -> Element + 'static) -> Element {
        Element::new(ElementKind::Consumer {
            context: self.clone(),
            render: Rc::new(render),
        })
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Context(#{})", self.0.id)
    }
}

// =============================================================================
// Element
// =============================================================================

pub type MemoCompare = Rc<dyn Fn(&Props, &Props) -> bool>;

#[derive(Clone)]
pub(crate) enum ElementKind {
    Empty,
    Text(Rc<str>),
    Host { tag: Rc<str>, props: Props },
    Fragment(Rc<Vec<Element>>),
    Component { component: Component, props: Props },
    Class { class: ClassType, props: Props },
    Portal { container: DomNode, children: Rc<Vec<Element>> },
    Provider { context: Context, value: Value, children: Rc<Vec<Element>> },
    Consumer { context: Context, render: Rc<dyn Fn(&Value) -> Element> },
    Memo { component: Component, props: Props, compare: Option<MemoCompare> },
    Lazy { lazy: Lazy, props: Props },
    Suspense { fallback: Rc<Element>, children: Rc<Vec<Element>> },
}

/// Identity used to decide whether a VNode can be reused for an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ElementType {
    Root,
    Empty,
    Text,
    Host(Rc<str>),
    Fragment,
    Component(std::any::TypeId),
    Class(std::any::TypeId),
    Portal(DomNode),
    Provider(u64),
    Consumer(u64),
    Memo(std::any::TypeId),
    Lazy(u64),
    Suspense,
}

/// Description of one piece of UI.
#[derive(Clone)]
pub struct Element {
    pub(crate) kind: ElementKind,
    pub(crate) key: Option<Key>,
    pub(crate) node_ref: Option<NodeRef>,
}

impl Element {
    pub(crate) fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            key: None,
            node_ref: None,
        }
    }

    pub fn with_key(mut self, key: impl fmt::Display) -> Self {
        self.key = Some(key.to_string().into());
        self
    }

    /// Attach a [`NodeRef`]. Only host elements fill it.
    pub fn with_ref(mut self, node_ref: &NodeRef) -> Self {
        self.node_ref = Some(node_ref.clone());
        self
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, ElementKind::Empty)
    }

    pub(crate) fn element_type(&self) -> ElementType {
        match &self.kind {
            ElementKind::Empty => ElementType::Empty,
            ElementKind::Text(_) => ElementType::Text,
            ElementKind::Host { tag, .. } => ElementType::Host(tag.clone()),
            ElementKind::Fragment(_) => ElementType::Fragment,
            ElementKind::Component { component, .. } => ElementType::Component(component.identity()),
            ElementKind::Class { class, .. } => ElementType::Class(class.identity()),
            ElementKind::Portal { container, .. } => ElementType::Portal(*container),
            ElementKind::Provider { context, .. } => ElementType::Provider(context.id()),
            ElementKind::Consumer { context, .. } => ElementType::Consumer(context.id()),
            ElementKind::Memo { component, .. } => ElementType::Memo(component.identity()),
            ElementKind::Lazy { lazy, .. } => ElementType::Lazy(lazy.id()),
            ElementKind::Suspense { .. } => ElementType::Suspense,
        }
    }

    /// Display name for logs and errors.
    pub fn type_name(&self) -> String {
        match &self.kind {
            ElementKind::Empty => "#empty".into(),
            ElementKind::Text(_) => "#text".into(),
            ElementKind::Host { tag, .. } => tag.to_string(),
            ElementKind::Fragment(_) => "Fragment".into(),
            ElementKind::Component { component, .. } => component.name().into(),
            ElementKind::Class { class, .. } => class.name().into(),
            ElementKind::Portal { .. } => "Portal".into(),
            ElementKind::Provider { .. } => "Provider".into(),
            ElementKind::Consumer { .. } => "Consumer".into(),
            ElementKind::Memo { component, .. } => format!("Memo({})", component.name()),
            ElementKind::Lazy { .. } => "Lazy".into(),
            ElementKind::Suspense { .. } => "Suspense".into(),
        }
    }

    /// Props of elements that carry them.
    pub fn props(&self) -> Option<&Props> {
        match &self.kind {
            ElementKind::Host { props, .. }
            | ElementKind::Component { props, .. }
            | ElementKind::Class { props, .. }
            | ElementKind::Memo { props, .. }
            | ElementKind::Lazy { props, .. } => Some(props),
            _ => None,
        }
    }

    /// Same type, key and prop allocation; used for cheap child comparison.
    fn same_description(&self, other: &Element) -> bool {
        if self.key != other.key || self.element_type() != other.element_type() {
            return false;
        }
        match (&self.kind, &other.kind) {
            (ElementKind::Text(a), ElementKind::Text(b)) => a == b,
            (ElementKind::Empty, ElementKind::Empty) => true,
            _ => match (self.props(), other.props()) {
                (Some(a), Some(b)) => a.ptr_eq(b),
                _ => false,
            },
        }
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ElementKind::Text(text) => write!(f, "{text:?}"),
            _ => {
                write!(f, "<{}", self.type_name())?;
                if let Some(key) = &self.key {
                    write!(f, " key={key:?}")?;
                }
                write!(f, ">")
            }
        }
    }
}

impl From<&str> for Element {
    fn from(s: &str) -> Self {
        text(s)
    }
}

impl From<String> for Element {
    fn from(s: String) -> Self {
        text(s)
    }
}

impl<T: Into<Element>> From<Option<T>> for Element {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_else(empty)
    }
}

// =============================================================================
// Constructors
// =============================================================================

/// Host element. `children` replace any children already in `props`.
pub fn h(tag: &str, props: Props, children: impl IntoIterator<Item = Element>) -> Element {
    let children: Vec<Element> = children.into_iter().collect();
    let props = if children.is_empty() { props } else { props.with_children(children) };
    Element::new(ElementKind::Host {
        tag: tag.into(),
        props,
    })
}

pub fn text(content: impl Into<Rc<str>>) -> Element {
    Element::new(ElementKind::Text(content.into()))
}

/// Renders nothing.
pub fn empty() -> Element {
    Element::new(ElementKind::Empty)
}

pub fn fragment(children: impl IntoIterator<Item = Element>) -> Element {
    Element::new(ElementKind::Fragment(Rc::new(children.into_iter().collect())))
}

/// Render `children` into `container`, outside the parent's host node.
/// Events still bubble through the element tree.
pub fn portal(container: DomNode, children: impl IntoIterator<Item = Element>) -> Element {
    Element::new(ElementKind::Portal {
        container,
        children: Rc::new(children.into_iter().collect()),
    })
}

/// Show `fallback` while anything below suspends.
pub fn suspense(fallback: Element, children: impl IntoIterator<Item = Element>) -> Element {
    Element::new(ElementKind::Suspense {
        fallback: Rc::new(fallback),
        children: Rc::new(children.into_iter().collect()),
    })
}

/// Skip re-rendering while props are shallowly equal.
pub fn memo(component: &Component, props: Props) -> Element {
    Element::new(ElementKind::Memo {
        component: component.clone(),
        props,
        compare: None,
    })
}

/// Like [`memo`] with a custom "props are equal" test.
pub fn memo_with(
    component: &Component,
    props: Props,
    compare: impl Fn(&Props, &Props) -> bool + 'static,
) -> Element {
    Element::new(ElementKind::Memo {
        component: component.clone(),
        props,
        compare: Some(Rc::new(compare)),
    })
}

pub fn class<C: ClassComponent>(props: Props) -> Element {
    Element::new(ElementKind::Class {
        class: ClassType::of::<C>(),
        props,
    })
}

pub fn lazy_element(lazy: &Lazy, props: Props) -> Element {
    Element::new(ElementKind::Lazy {
        lazy: lazy.clone(),
        props,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_props_builder_and_lookup() {
        let props = Props::new()
            .with("id", "a")
            .with("id", "b")
            .on("click", |_| {})
            .with_children([text("x")]);
        assert_eq!(props.get("id"), Value::from("b"));
        assert_eq!(props.len(), 2);
        assert!(props.handler("click", false).is_some());
        assert!(props.handler("click", true).is_none());
        assert_eq!(props.get("on:click"), Value::Undefined);
        assert_eq!(props.children().len(), 1);
    }

    #[test]
    fn test_shallow_eq() {
        let a = Props::new().with("n", 1);
        let b = Props::new().with("n", 1);
        let c = Props::new().with("n", 2);
        assert!(a.shallow_eq(&b));
        assert!(!a.shallow_eq(&c));

        let h1 = Props::new().on("click", |_| {});
        let h2 = Props::new().on("click", |_| {});
        assert!(!h1.shallow_eq(&h2));
        assert!(h1.shallow_eq(&h1.clone()));
    }

    #[test]
    fn test_element_types() {
        let ctx = create_context(0);
        assert_eq!(h("div", Props::new(), []).element_type(), ElementType::Host("div".into()));
        assert_eq!(ctx.provider(1, []).element_type(), ElementType::Provider(ctx.id()));
        assert_ne!(
            create_context(0).provider(1, []).element_type(),
            ctx.provider(1, []).element_type()
        );
        assert_eq!(text("a").with_key(3).key(), Some("3"));
        assert!(Element::from(None::<&str>).is_empty());
    }
}
