use std::time::Duration;

use crate::status::Status;

/// A node in the hierarchical health verdict (§3 "Response", §4.5).
///
/// Invariant: `status` is always >= the max severity of `children` (enforced
/// by [`Response::with_children`] / the orchestrator, never by this type
/// alone, since leaves legitimately set their own status without children).
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub kind: String,
    pub name: String,
    pub status: Status,
    pub messages: Vec<String>,
    pub duration: Duration,
    pub children: Vec<Response>,
}

impl Response {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, status: Status) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            status,
            messages: Vec::new(),
            duration: Duration::ZERO,
            children: Vec::new(),
        }
    }

    pub fn healthy(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(kind, name, Status::Healthy)
    }

    pub fn unhealthy(
        kind: impl Into<String>,
        name: impl Into<String>,
        messages: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut response = Self::new(kind, name, Status::Unhealthy);
        response.messages = messages.into_iter().map(Into::into).collect();
        response
    }

    pub fn loop_detected(
        kind: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut response = Self::new(kind, name, Status::LoopDetected);
        response.messages.push(message.into());
        response
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    pub fn with_messages(mut self, messages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.messages.extend(messages.into_iter().map(Into::into));
        self
    }

    /// Attaches children and recomputes this node's status as the
    /// aggregate of its own current status and every child's status
    /// (§4.4 "Aggregation rules").
    pub fn with_children(mut self, children: Vec<Response>) -> Self {
        self.status = Status::aggregate(
            std::iter::once(self.status).chain(children.iter().map(|c| c.status)),
        );
        self.children = children;
        self
    }

    /// Flattens the tree into a single sequence, joining nested names with
    /// `/` the way §4.5 specifies. The node itself is included first,
    /// followed by its descendants in depth-first order.
    pub fn flatten(&self) -> Vec<FlatResponse> {
        let mut out = Vec::new();
        self.flatten_into(None, None, &mut out);
        out
    }

    fn flatten_into(
        &self,
        prefix_name: Option<&str>,
        prefix_kind: Option<&str>,
        out: &mut Vec<FlatResponse>,
    ) {
        let name = match prefix_name {
            Some(p) => format!("{p}/{}", self.name),
            None => self.name.clone(),
        };
        let kind = match prefix_kind {
            Some(p) => format!("{p}/{}", self.kind),
            None => self.kind.clone(),
        };
        out.push(FlatResponse {
            name: name.clone(),
            kind: kind.clone(),
            status: self.status,
            messages: self.messages.clone(),
            duration: self.duration,
        });
        for child in &self.children {
            child.flatten_into(Some(&name), Some(&kind), out);
        }
    }

    /// Recursively keeps only non-healthy nodes, trimming healthy leaves
    /// (§4.5 "filter_unhealthy"). Returns `None` if this whole subtree is
    /// healthy.
    pub fn filter_unhealthy(&self) -> Option<Response> {
        if self.status == Status::Healthy {
            return None;
        }
        let children: Vec<Response> = self
            .children
            .iter()
            .filter_map(Response::filter_unhealthy)
            .collect();
        Some(Response {
            kind: self.kind.clone(),
            name: self.name.clone(),
            status: self.status,
            messages: self.messages.clone(),
            duration: self.duration,
            children,
        })
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// One row of a [`Response::flatten`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatResponse {
    pub name: String,
    pub kind: String,
    pub status: Status,
    pub messages: Vec<String>,
    pub duration: Duration,
}
