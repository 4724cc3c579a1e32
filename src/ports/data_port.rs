//! Bar history access port trait.

use crate::domain::asset::{Asset, AssetHistory};
use crate::domain::error::BarreplayError;

pub trait DataPort {
    /// Bars of `name`, ascending by timestamp.
    fn load_history(&self, name: &str) -> Result<AssetHistory, BarreplayError>;

    /// Fails with `NoData` when the history is empty.
    fn load_asset(&self, name: &str) -> Result<Asset, BarreplayError> {
        let history = self.load_history(name)?;
        if history.is_empty() {
            return Err(BarreplayError::NoData {
                name: name.to_string(),
            });
        }
        Ok(Asset::new(name, history))
    }
}
