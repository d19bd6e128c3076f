pub mod extract;
pub mod layout;
pub mod package;
pub mod regenerate;
pub mod tree;
pub mod xml;
