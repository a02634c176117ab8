/// Controls how definitions enter a [`crate::SchemaRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// When true, every fragment is checked against the fragment meta-schema.
    pub check_definitions: bool,
    /// When true, registering an existing name replaces the fragment.
    pub allow_overwrite: bool,
    /// Maximum number of catalogues loaded from a directory.
    pub max_catalogues_from_directory: usize,
    /// Maximum bytes allowed per catalogue file loaded from a directory.
    pub max_catalogue_file_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            check_definitions: true,
            allow_overwrite: false,
            max_catalogues_from_directory: 64,
            max_catalogue_file_size: 4 * 1024 * 1024,
        }
    }
}
