use crate::registry::RegistryError;

/// Why a classified command could not be carried out
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("No route for intent '{intent}'")]
    NoRoute { intent: String },

    #[error("No enabled plugin provides capability '{capability}'")]
    NoProvider { capability: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
