use stow_types::{Attributes, Key};
use tracing::debug;

use crate::model::ModelType;

/// Store and identity-map operations reported through `tracing`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Operation {
    Get,
    Set,
    Delete,
    MapGet,
    MapSet,
    MapDelete,
}

impl Operation {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Delete => "del",
            Self::MapGet => "img",
            Self::MapSet => "ims",
            Self::MapDelete => "imd",
        }
    }
}

pub(crate) fn log_operation(op: Operation, model: &ModelType, key: &Key, attrs: Option<&Attributes>) {
    let store = model.store_name();
    match attrs {
        Some(attrs) => debug!(
            op = op.as_str(),
            model = model.name(),
            store = %store,
            key = %key,
            attrs = ?attrs,
            "stow"
        ),
        None => debug!(
            op = op.as_str(),
            model = model.name(),
            store = %store,
            key = %key,
            "stow"
        ),
    }
}
