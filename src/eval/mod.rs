pub mod cycle;
pub mod globals;
pub mod growth;
pub mod scope;
