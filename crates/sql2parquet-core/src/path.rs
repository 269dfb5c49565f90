//! Destination path composition
//!
//! Generates Hive-style partition paths:
//! `{base}/year={year}/month={month}/day={day}/data.parquet`
//!
//! Year, month and day are unpadded so paths stay compatible with existing
//! exports (`month=1`, not `month=01`).

use crate::partition::PartitionKey;

/// File name written inside every partition directory
pub const DATA_FILE_NAME: &str = "data.parquet";

/// Compose the object key for a partition under `base`.
///
/// Leading and trailing slashes on `base` are ignored; an empty base puts the
/// partition directories at the root of the bucket.
pub fn destination_path(base: &str, key: PartitionKey) -> String {
    let base = base.trim_matches('/');
    if base.is_empty() {
        format!("{}/{}", key, DATA_FILE_NAME)
    } else {
        format!("{}/{}/{}", base, key, DATA_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_path() {
        let key = PartitionKey::new(2024, 1, 15);
        assert_eq!(
            destination_path("path/to/destination", key),
            "path/to/destination/year=2024/month=1/day=15/data.parquet"
        );
    }

    #[test]
    fn test_destination_path_normalizes_base() {
        let key = PartitionKey::new(2023, 12, 3);
        assert_eq!(
            destination_path("/exports/orders/", key),
            "exports/orders/year=2023/month=12/day=3/data.parquet"
        );
        assert_eq!(
            destination_path("", key),
            "year=2023/month=12/day=3/data.parquet"
        );
    }
}
