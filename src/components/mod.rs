pub mod inspector;
pub mod status_bar;
pub mod tree;
