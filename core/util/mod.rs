pub(crate) mod from_file;
pub(crate) mod fs;
pub(crate) mod serde;
