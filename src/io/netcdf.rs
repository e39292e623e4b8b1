use crate::manning::{Coordinate, ManningField};
use anyhow::{Context, Result, bail};
use netcdf::{AttributeValue, Variable};
use std::path::Path;

fn string_attribute(var: &Variable, name: &str) -> Option<String> {
    match var.attribute(name)?.value() {
        Ok(AttributeValue::Str(s)) => Some(s),
        _ => None,
    }
}

// Values of a numeric variable as f64, whether stored as double or float
fn read_f64_values(var: &Variable) -> Result<Vec<f64>> {
    match var.get_values::<f64, _>(..) {
        Ok(values) => Ok(values),
        Err(_) => {
            let values = var
                .get_values::<f32, _>(..)
                .with_context(|| format!("Variable '{}' is not numeric", var.name()))?;
            Ok(values.into_iter().map(f64::from).collect())
        }
    }
}

/// Read the roughness variable `item_name` and its coordinates from a netCDF file
pub fn read_field(path: &Path, item_name: &str) -> Result<ManningField> {
    let file = netcdf::open(path).with_context(|| format!("Failed to read {:?}", path))?;

    let Some(var) = file.variable(item_name) else {
        bail!("Failed to read {:?}: no variable named '{}'", path, item_name);
    };

    let dims: Vec<(String, usize)> = var
        .dimensions()
        .iter()
        .map(|dim| (dim.name(), dim.len()))
        .collect();
    let values =
        read_f64_values(&var).with_context(|| format!("Failed to read {:?}", path))?;

    let mut field = ManningField::new(item_name, dims.clone(), values)
        .with_context(|| format!("Failed to read {:?}", path))?;
    field.units = string_attribute(&var, "units");
    field.long_name = string_attribute(&var, "long_name");

    for (dim_name, len) in &dims {
        let Some(coord_var) = file.variable(dim_name) else {
            continue;
        };
        if coord_var.dimensions().len() != 1 {
            continue;
        }
        let values = read_f64_values(&coord_var)?;
        if values.len() == *len {
            field.coords.push(Coordinate {
                name: dim_name.clone(),
                values,
                units: string_attribute(&coord_var, "units"),
            });
        }
    }

    Ok(field)
}

/// Write a field and its coordinates to a new netCDF file
pub fn write_field(path: &Path, field: &ManningField) -> Result<()> {
    let mut file = netcdf::create(path)
        .with_context(|| format!("Failed to create netCDF file: {:?}", path))?;

    file.add_attribute("source", "manning_tune")?;

    for (name, len) in &field.dims {
        file.add_dimension(name, *len)?;
    }

    for coord in &field.coords {
        let mut var = file.add_variable::<f64>(&coord.name, &[coord.name.as_str()])?;
        if let Some(units) = &coord.units {
            var.put_attribute("units", units.as_str())?;
        }
        var.put_values(&coord.values, ..)?;
    }

    let dim_names: Vec<&str> = field.dims.iter().map(|(name, _)| name.as_str()).collect();
    let mut var = file.add_variable::<f64>(&field.item_name, &dim_names)?;
    if let Some(units) = &field.units {
        var.put_attribute("units", units.as_str())?;
    }
    if let Some(long_name) = &field.long_name {
        var.put_attribute("long_name", long_name.as_str())?;
    }
    var.put_values(&field.values, ..)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_then_read_keeps_values_and_coords() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manning.nc");

        let mut field = ManningField::new(
            "manning",
            vec![("lat".into(), 2), ("lon".into(), 3)],
            vec![32.0, 32.0, 20.0, 0.5, 32.0, 20.0],
        )
        .unwrap()
        .with_coordinate("lat", vec![54.0, 55.0])
        .with_coordinate("lon", vec![2.0, 3.0, 4.0]);
        field.units = Some("m^(1/3)/s".to_string());

        write_field(&path, &field).unwrap();
        let read = read_field(&path, "manning").unwrap();

        assert_eq!(read.values, field.values);
        assert_eq!(read.dims, field.dims);
        assert_eq!(read.coordinate("lat"), Some(&[54.0, 55.0][..]));
        assert_eq!(read.units.as_deref(), Some("m^(1/3)/s"));
    }

    #[test]
    fn test_read_missing_item() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manning.nc");
        let field =
            ManningField::new("roughness", vec![("y".into(), 1), ("x".into(), 1)], vec![1.0])
                .unwrap();
        write_field(&path, &field).unwrap();

        let err = read_field(&path, "manning").unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempdir().unwrap();
        assert!(read_field(&dir.path().join("absent.nc"), "manning").is_err());
    }
}
