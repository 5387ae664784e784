use gridsmith_core::RangeAddress;
use serde_json::Value;
use thiserror::Error;

/// The host's complaint about an array written to a bulk property.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("InvalidArgument: The argument is invalid or missing or has an incorrect format. `{property}` expects a 2D array like [[value]]")]
    NotTwoDimensional { property: String },
    #[error("InvalidArgument: The number of rows or columns in the input array doesn't match the size or dimensions of the range. {address} is {rows}x{cols} but the array is {got}")]
    Mismatch {
        address: String,
        rows: u32,
        cols: u32,
        got: String,
    },
}

/// Checks a value written to `values`, `formulas` or `numberFormat`.
///
/// A scalar is broadcast to every cell and always passes. Arrays must be two
/// levels deep and, when the target address is known, sized exactly to it.
/// Real-target stubs call this too so both sides reject the same writes.
pub fn check_bulk_shape(
    property: &str,
    value: &Value,
    target: Option<&RangeAddress>,
) -> Result<(), ShapeError> {
    let Some(rows) = value.as_array() else {
        return Ok(());
    };
    if rows.is_empty() || !rows.iter().all(Value::is_array) {
        return Err(ShapeError::NotTwoDimensional {
            property: property.to_string(),
        });
    }
    let Some(target) = target else {
        return Ok(());
    };
    let widths: Vec<usize> = rows
        .iter()
        .filter_map(|r| r.as_array().map(Vec::len))
        .collect();
    let ragged = widths.windows(2).any(|w| w[0] != w[1]);
    let width = widths.first().copied().unwrap_or(0);
    if ragged || rows.len() != target.rows() as usize || width != target.cols() as usize {
        let got = if ragged {
            format!("{} ragged rows", rows.len())
        } else {
            format!("{}x{width}", rows.len())
        };
        return Err(ShapeError::Mismatch {
            address: target.local(),
            rows: target.rows(),
            cols: target.cols(),
            got,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn addr(s: &str) -> RangeAddress {
        RangeAddress::parse(s).unwrap()
    }

    #[test]
    fn scalars_broadcast() {
        assert!(check_bulk_shape("values", &json!("x"), Some(&addr("A1:C3"))).is_ok());
    }

    #[test]
    fn one_level_arrays_are_rejected() {
        let err = check_bulk_shape("values", &json!(["a", "b"]), Some(&addr("A1:B1"))).unwrap_err();
        assert!(matches!(err, ShapeError::NotTwoDimensional { .. }));
    }

    #[test]
    fn size_must_match_known_target() {
        assert!(check_bulk_shape("formulas", &json!([["=1", "=2"]]), Some(&addr("A1:B1"))).is_ok());
        let err = check_bulk_shape("values", &json!([[1, 2]]), Some(&addr("A1:C1"))).unwrap_err();
        assert!(err.to_string().contains("A1:C1 is 1x3 but the array is 1x2"));
        assert!(check_bulk_shape("values", &json!([[1, 2], [3]]), Some(&addr("A1:B2"))).is_err());
        assert!(check_bulk_shape("values", &json!([[1, 2]]), None).is_ok());
    }
}
