use crate::migrate::schema::{ColumnSpec, TableSpec};
use crate::migrate::{Migration, Result};

pub const ID: &str = "2015_03_07_311077_create_tracker_cookies_table";

pub fn migration() -> Result<Migration> {
    let table = TableSpec::new("tracker_cookies")
        .column(ColumnSpec::big_increments("id"))
        .column(ColumnSpec::string("uuid").unique())
        .column(ColumnSpec::string("cookie_data").nullable())
        .timestamps()
        .index(&["created_at"])
        .index(&["updated_at"]);

    Migration::create_table(ID, table)
}
