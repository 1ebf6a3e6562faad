//! Layered configuration.
//!
//! Tiers, lowest priority first, merged field by field:
//! 1. **Defaults** - compiled in
//! 2. **Project** - `./shop-schedule/config.yaml`
//! 3. **User** - `~/.shop-schedule/config.yaml`
//! 4. **Environment** - variables below
//!
//! ## Environment Variables
//! - `SHOP_SCHEDULE_CONFIG_PATH` - Explicit config file (overrides all file tiers)
//! - `SHOP_SCHEDULE_SHEETS_API_KEY` - Spreadsheet read key
//! - `SHOP_SCHEDULE_STORE_URL` - Store base URL
//! - `SHOP_SCHEDULE_STORE_KEY` - Store API key
//! - `SHOP_SCHEDULE_SERVICE_ACCOUNT` - Path to the service-account key file
//! - `SHOP_SCHEDULE_PORT` - Board server port
//! - `SHOP_SCHEDULE_USER_DIR` / `SHOP_SCHEDULE_PROJECT_DIR` - Tier directories

mod loader;
mod merge;
mod types;

pub use loader::{ConfigLoader, ConfigPaths, ConfigTier};
pub use merge::{deep_merge, deep_merge_all};
pub use types::*;
