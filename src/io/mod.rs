pub mod compression;
pub mod split;
