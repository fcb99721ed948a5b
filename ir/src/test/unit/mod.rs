pub mod allocation;
pub mod inplace;
pub mod shape;
