use usage_core::ModelPrice;

use crate::Db;
use crate::error::Result;
use crate::migrations::table_exists;

impl Db {
    pub fn list_model_prices(&self) -> Result<Vec<ModelPrice>> {
        if !table_exists(&self.conn, "model_pricing")? {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            r#"
            SELECT model_name, input_price_per_mtok, output_price_per_mtok,
                   cache_write_price_per_mtok, cache_read_price_per_mtok
            FROM model_pricing
            ORDER BY model_name ASC
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ModelPrice {
                    model_pattern: row.get(0)?,
                    input_per_1m: row.get(1)?,
                    output_per_1m: row.get(2)?,
                    cache_write_per_1m: row.get(3)?,
                    cache_read_per_1m: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
