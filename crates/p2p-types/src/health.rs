/// A single health observation emitted by a component onto its health
/// channel. The Node façade aggregates these into `Health() -> {ok,
/// issues[]}` for the hosting application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthEvent {
    pub component: &'static str,
    pub ok: bool,
    pub detail: String,
}

impl HealthEvent {
    pub fn ok(component: &'static str, detail: impl Into<String>) -> Self {
        Self {
            component,
            ok: true,
            detail: detail.into(),
        }
    }

    pub fn issue(component: &'static str, detail: impl Into<String>) -> Self {
        Self {
            component,
            ok: false,
            detail: detail.into(),
        }
    }
}
