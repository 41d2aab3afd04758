use log::{debug, info};

use crate::{error::SessionError, targets::McuVariant};

/// Outcome of an interactive variant selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The type identifier of the selected variant
    Selected(String),
    /// The selection was aborted
    Cancelled,
}

/// Chooses one of several memory layout variants matching a target
///
/// Resolution may block for as long as it takes the operator to decide.
pub trait VariantResolver {
    fn resolve(&mut self, candidates: &[McuVariant]) -> Resolution;
}

impl<F> VariantResolver for F
where
    F: FnMut(&[McuVariant]) -> Resolution,
{
    fn resolve(&mut self, candidates: &[McuVariant]) -> Resolution {
        self(candidates)
    }
}

/// Resolves ambiguities with a selection made up front
///
/// The selection matches a candidate by its exact type identifier, or else
/// the first candidate whose type identifier starts with it (e.g. `GD32`).
/// Without a selection every ambiguity is cancelled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreselectedResolver {
    selection: Option<String>,
}

impl PreselectedResolver {
    pub fn new(selection: impl Into<String>) -> Self {
        Self {
            selection: Some(selection.into()),
        }
    }

    /// A resolver that cancels every ambiguity
    pub fn cancelling() -> Self {
        Self { selection: None }
    }
}

impl VariantResolver for PreselectedResolver {
    fn resolve(&mut self, candidates: &[McuVariant]) -> Resolution {
        let Some(selection) = &self.selection else {
            return Resolution::Cancelled;
        };

        let prefix = selection.to_ascii_lowercase();
        let selected = candidates
            .iter()
            .find(|v| v.type_id.eq_ignore_ascii_case(selection))
            .or_else(|| {
                candidates
                    .iter()
                    .find(|v| v.type_id.to_ascii_lowercase().starts_with(&prefix))
            });

        match selected {
            Some(variant) => Resolution::Selected(variant.type_id.to_owned()),
            None => Resolution::Cancelled,
        }
    }
}

/// Pick the variant among `candidates`, asking `resolver` if there is more
/// than one
///
/// Device sessions call this once they have narrowed the known variants down
/// to the ones matching the target.
pub fn select_variant(
    candidates: &[McuVariant],
    resolver: &mut dyn VariantResolver,
) -> Result<(McuVariant, bool), SessionError> {
    match candidates {
        [] => Err(SessionError::TargetNotFound),
        [single] => {
            debug!("Target identified as {}", single.type_id);
            Ok((*single, false))
        }
        candidates => {
            info!(
                "{} memory layout variants match the target, resolving",
                candidates.len()
            );

            match resolver.resolve(candidates) {
                Resolution::Selected(id) => candidates
                    .iter()
                    .find(|v| v.type_id == id)
                    .map(|v| (*v, true))
                    .ok_or(SessionError::UnknownVariant(id)),
                Resolution::Cancelled => Err(SessionError::ResolutionCancelled),
            }
        }
    }
}
