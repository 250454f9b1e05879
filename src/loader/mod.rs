//! Loader - everything between a URL and a parsed template.
//!
//! - **Declarations** - typed records a template declares
//! - **Parser** - raw body to [`ParsedTemplate`], with [`BlueprintParser`]
//! - **Fetch** - the [`Fetcher`] transport and in-flight futures
//! - **Cache** - download status, bodies and templates per URL
//! - **Requirements** - ordered, deduplicated requirement sets
//! - **Script** - one-time script execution

mod cache;
mod declarations;
mod fetch;
mod parser;
mod requirements;
mod script;

pub use cache::*;
pub use declarations::*;
pub use fetch::*;
pub use parser::*;
pub use requirements::*;
pub use script::*;
