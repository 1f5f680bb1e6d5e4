//! Action and render contexts used by fillability and visibility rules

use serde::{Deserialize, Serialize};

/// The CRUD action a value is being handled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionContext {
    Create,
    Read,
    Update,
    Delete,
}

impl ActionContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionContext::Create => "create",
            ActionContext::Read => "read",
            ActionContext::Update => "update",
            ActionContext::Delete => "delete",
        }
    }
}

/// Any context a field can be hidden in: the four actions plus render contexts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Context {
    Create,
    Read,
    Update,
    Delete,
    Form,
    Table,
    Submit,
}

impl From<ActionContext> for Context {
    fn from(ctx: ActionContext) -> Self {
        match ctx {
            ActionContext::Create => Context::Create,
            ActionContext::Read => Context::Read,
            ActionContext::Update => Context::Update,
            ActionContext::Delete => Context::Delete,
        }
    }
}

/// `fillable` setting: a flag for every context, or the list of contexts
///
/// An empty list matches no context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Fillable {
    All(bool),
    Contexts(Vec<ActionContext>),
}

impl Default for Fillable {
    fn default() -> Self {
        Fillable::All(true)
    }
}

impl Fillable {
    /// Without a context, a list falls back to the default (fillable)
    pub fn allows(&self, context: Option<ActionContext>) -> bool {
        match (self, context) {
            (Fillable::All(flag), _) => *flag,
            (Fillable::Contexts(list), Some(ctx)) => list.contains(&ctx),
            (Fillable::Contexts(_), None) => true,
        }
    }

    pub(crate) fn has_duplicates(&self) -> bool {
        match self {
            Fillable::All(_) => false,
            Fillable::Contexts(list) => {
                let mut seen = std::collections::HashSet::new();
                !list.iter().all(|c| seen.insert(*c))
            }
        }
    }
}

/// `hidden` setting: a flag for every context, or the list of contexts
///
/// An empty list matches no context, i.e. the field is hidden nowhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Hidden {
    All(bool),
    Contexts(Vec<Context>),
}

impl Default for Hidden {
    fn default() -> Self {
        Hidden::All(false)
    }
}

impl Hidden {
    /// Without a context, a list falls back to the default (visible)
    pub fn hides(&self, context: Option<Context>) -> bool {
        match (self, context) {
            (Hidden::All(flag), _) => *flag,
            (Hidden::Contexts(list), Some(ctx)) => list.contains(&ctx),
            (Hidden::Contexts(_), None) => false,
        }
    }

    pub(crate) fn has_duplicates(&self) -> bool {
        match self {
            Hidden::All(_) => false,
            Hidden::Contexts(list) => {
                let mut seen = std::collections::HashSet::new();
                !list.iter().all(|c| seen.insert(*c))
            }
        }
    }
}
