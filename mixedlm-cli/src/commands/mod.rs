pub mod fit;
pub mod show;
