//! Inventory selection.
//!
//! | Variant       | Contribution      | Owned resource                 |
//! |---------------|-------------------|--------------------------------|
//! | `Unspecified` | nothing           | none                           |
//! | `Path`        | `-i <path>`       | none                           |
//! | `Content`     | `-i <temp file>`  | temp file, 0500 dynamic / 0400 |
//!
//! The content file is registered with the invocation's `ArtifactLedger`,
//! so the inventory teardown is the ledger teardown.

use crate::args::ArgumentList;
use crate::error::Result;
use crate::expand::EnvVars;
use crate::workspace::{ArtifactKind, ArtifactLedger};

/// Mode of a static inline inventory.
pub const STATIC_INVENTORY_MODE: u32 = 0o400;
/// Mode of an executable (dynamic) inline inventory.
pub const DYNAMIC_INVENTORY_MODE: u32 = 0o500;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Inventory {
    /// Let the tool use its own configured inventory.
    #[default]
    Unspecified,
    /// A file, directory or host list passed through `-i`.
    Path(String),
    /// Inline inventory written to a temp file; `dynamic` makes it executable.
    Content { content: String, dynamic: bool },
}

impl Inventory {
    pub fn path(path: impl Into<String>) -> Self {
        Inventory::Path(path.into())
    }

    pub fn content(content: impl Into<String>, dynamic: bool) -> Self {
        Inventory::Content {
            content: content.into(),
            dynamic,
        }
    }

    /// Append this inventory's arguments.
    pub fn add_argument(
        &self,
        args: &mut ArgumentList,
        env: &EnvVars,
        ledger: &mut ArtifactLedger<'_>,
    ) -> Result<()> {
        match self {
            Inventory::Unspecified => {}
            Inventory::Path(path) => {
                let expanded = env.expand(path);
                if !expanded.is_empty() {
                    args.add_option("-i", expanded);
                }
            }
            Inventory::Content { content, dynamic } => {
                let mode = if *dynamic {
                    DYNAMIC_INVENTORY_MODE
                } else {
                    STATIC_INVENTORY_MODE
                };
                let mut body = env.expand(content);
                body.push('\n');
                let path = ledger.create(ArtifactKind::Inventory, mode, None, body.as_bytes())?;
                args.add_option("-i", path.display().to_string());
            }
        }
        Ok(())
    }
}
