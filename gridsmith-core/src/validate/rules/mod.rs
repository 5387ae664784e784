pub(crate) mod api;
pub(crate) mod arrays;
pub(crate) mod dialect;
pub(crate) mod performance;
pub(crate) mod ranges;
pub(crate) mod routines;
pub(crate) mod sheets;
pub(crate) mod standards;
pub(crate) mod syntax;
pub(crate) mod wrapper;
