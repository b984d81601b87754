use crate::migrate::{Registry, Result};

pub mod m2015_03_07_311077_create_tracker_cookies_table;

/// Migrations shipped with the crate.
pub fn registry() -> Result<Registry> {
    Registry::new(vec![
        m2015_03_07_311077_create_tracker_cookies_table::migration()?,
    ])
}
