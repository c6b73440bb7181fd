//! Registry of the operations the backend knows how to run.

use std::collections::HashSet;

use crate::domain::OperationDescriptor;
use crate::error::{CoreError, Result};

pub const INSTALL_SIDESTORE: &str = "install_sidestore";
pub const SIDELOAD: &str = "sideload";

/// Install SideStore: download the build, sign and install it, then place
/// the pairing file on the device.
pub fn install_sidestore() -> OperationDescriptor {
    OperationDescriptor::new(INSTALL_SIDESTORE, "Installing SideStore")
        .with_step("download", "Download SideStore")
        .with_step("install", "Sign & Install SideStore")
        .with_step("pairing", "Place Pairing File")
        .with_success_title("SideStore Installed")
}

/// Sign and install an arbitrary IPA.
pub fn sideload() -> OperationDescriptor {
    OperationDescriptor::new(SIDELOAD, "Installing App").with_step("install", "Sign & Install App")
}

/// Immutable, validated set of operation descriptors.
#[derive(Debug, Clone)]
pub struct OperationCatalog {
    operations: Vec<OperationDescriptor>,
}

impl OperationCatalog {
    /// Build a catalog, rejecting invalid descriptors and duplicate ids.
    pub fn new(operations: impl IntoIterator<Item = OperationDescriptor>) -> Result<Self> {
        let operations: Vec<_> = operations.into_iter().collect();

        let mut seen = HashSet::with_capacity(operations.len());
        for operation in &operations {
            operation.validate()?;
            if !seen.insert(operation.id.as_str()) {
                return Err(CoreError::DuplicateOperation(operation.id.clone()));
            }
        }

        Ok(Self { operations })
    }

    /// The operations shipped with the application.
    pub fn builtin() -> Self {
        Self {
            operations: vec![install_sidestore(), sideload()],
        }
    }

    /// A new catalog holding these operations followed by `extra`.
    pub fn with_additional(
        &self,
        extra: impl IntoIterator<Item = OperationDescriptor>,
    ) -> Result<Self> {
        Self::new(self.operations.iter().cloned().chain(extra))
    }

    pub fn find(&self, id: &str) -> Option<&OperationDescriptor> {
        self.operations.iter().find(|op| op.id == id)
    }

    pub fn get(&self, id: &str) -> Result<&OperationDescriptor> {
        self.find(id)
            .ok_or_else(|| CoreError::OperationNotFound(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &OperationDescriptor> {
        self.operations.iter()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl Default for OperationCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_valid() {
        let builtin = OperationCatalog::builtin();
        let rebuilt = OperationCatalog::new(builtin.iter().cloned()).unwrap();
        assert_eq!(rebuilt.len(), 2);
    }

    #[test]
    fn test_builtin_steps() {
        let catalog = OperationCatalog::builtin();
        let install = catalog.get(INSTALL_SIDESTORE).unwrap();
        let ids: Vec<_> = install.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["download", "install", "pairing"]);

        let sideload = catalog.get(SIDELOAD).unwrap();
        assert_eq!(sideload.title, "Installing App");
        assert_eq!(sideload.steps.len(), 1);
    }

    #[test]
    fn test_get_unknown() {
        let catalog = OperationCatalog::builtin();
        assert_eq!(
            catalog.get("restore").unwrap_err(),
            CoreError::OperationNotFound("restore".to_string())
        );
    }

    #[test]
    fn test_duplicate_operation_rejected() {
        let result = OperationCatalog::builtin().with_additional([sideload()]);
        assert_eq!(
            result.unwrap_err(),
            CoreError::DuplicateOperation(SIDELOAD.to_string())
        );
    }

    #[test]
    fn test_with_additional_keeps_order() {
        let extra = OperationDescriptor::new("pair_device", "Pairing Device")
            .with_step("pair", "Pair Device");
        let catalog = OperationCatalog::builtin().with_additional([extra]).unwrap();
        let ids: Vec<_> = catalog.iter().map(|op| op.id.as_str()).collect();
        assert_eq!(ids, vec![INSTALL_SIDESTORE, SIDELOAD, "pair_device"]);
    }

    #[test]
    fn test_invalid_additional_rejected() {
        let extra = OperationDescriptor::new("empty", "Nothing");
        assert!(OperationCatalog::builtin().with_additional([extra]).is_err());
    }
}
