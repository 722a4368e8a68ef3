// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

/// A data bundle as recorded in the VaultDB catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleDescriptor {
    pub bundle_id: u64,
    /// MD5 or SHA-1 of the bundle, hex in either case
    pub digest: String,
}

impl BundleDescriptor {
    #[must_use]
    pub fn new(bundle_id: u64, digest: impl Into<String>) -> Self {
        Self {
            bundle_id,
            digest: digest.into(),
        }
    }

    #[must_use]
    pub fn object_name(&self, vault_path: &str) -> String {
        bundle_object_name(vault_path, self.bundle_id)
    }
}

/// `<vault-path>/BUNDLES/<bundle-id>`, the id zero-padded to 10 digits
#[must_use]
pub fn bundle_object_name(vault_path: &str, bundle_id: u64) -> String {
    format!("{}/BUNDLES/{bundle_id:010}", vault_path.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_names() {
        assert_eq!(bundle_object_name("v", 42), "v/BUNDLES/0000000042");
        assert_eq!(bundle_object_name("v/", 0), "v/BUNDLES/0000000000");
        assert_eq!(
            BundleDescriptor::new(12_345_678_901, "x").object_name("v"),
            "v/BUNDLES/12345678901"
        );
    }
}
