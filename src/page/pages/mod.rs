// Built-in page modules. Adding a page means adding its file here and to ALL.

pub mod generic;
pub mod posts;
pub mod profile;

use super::PageModule;

/// Every page served by `/api/page/:page/:component`
pub const ALL: &[&PageModule] = &[&generic::PAGE, &profile::PAGE, &posts::PAGE];
