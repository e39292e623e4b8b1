use crate::zones::Zone;
use anyhow::{Result, bail, ensure};

// 1-D coordinate variable along one of the field's dimensions
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate {
    pub name: String,
    pub values: Vec<f64>,
    pub units: Option<String>,
}

/// Gridded Manning roughness coefficients.
///
/// Values are stored flat in row-major order over `dims`, whose last two entries are the
/// spatial (y, x) dimensions. A leading time dimension is allowed.
#[derive(Debug, Clone, PartialEq)]
pub struct ManningField {
    pub item_name: String,
    pub dims: Vec<(String, usize)>,
    pub values: Vec<f64>,
    pub coords: Vec<Coordinate>,
    pub units: Option<String>,
    pub long_name: Option<String>,
}

impl ManningField {
    pub fn new(item_name: &str, dims: Vec<(String, usize)>, values: Vec<f64>) -> Result<Self> {
        ensure!(
            (2..=3).contains(&dims.len()),
            "Field '{}' must have 2 or 3 dimensions, found {}",
            item_name,
            dims.len()
        );
        let expected: usize = dims.iter().map(|(_, len)| len).product();
        ensure!(
            values.len() == expected,
            "Field '{}' has {} values but its dimensions hold {}",
            item_name,
            values.len(),
            expected
        );

        Ok(ManningField {
            item_name: item_name.to_string(),
            dims,
            values,
            coords: Vec::new(),
            units: None,
            long_name: None,
        })
    }

    pub fn with_coordinate(mut self, name: &str, values: Vec<f64>) -> Self {
        self.coords.push(Coordinate {
            name: name.to_string(),
            values,
            units: None,
        });
        self
    }

    pub fn nx(&self) -> usize {
        self.dims[self.dims.len() - 1].1
    }

    pub fn ny(&self) -> usize {
        self.dims[self.dims.len() - 2].1
    }

    /// Coordinate values along a named dimension
    pub fn coordinate(&self, dim: &str) -> Option<&[f64]> {
        self.coords
            .iter()
            .find(|c| c.name == dim)
            .map(|c| c.values.as_slice())
    }

    /// X coordinates of cell centres, or cell indices if the file has none
    pub fn x_coords(&self) -> Vec<f64> {
        let (name, len) = &self.dims[self.dims.len() - 1];
        self.axis(name, *len)
    }

    /// Y coordinates of cell centres, or cell indices if the file has none
    pub fn y_coords(&self) -> Vec<f64> {
        let (name, len) = &self.dims[self.dims.len() - 2];
        self.axis(name, *len)
    }

    fn axis(&self, name: &str, len: usize) -> Vec<f64> {
        match self.coordinate(name) {
            Some(values) if values.len() == len => values.to_vec(),
            _ => (0..len).map(|i| i as f64).collect(),
        }
    }

    /// Values of the first time step as a (y, x) grid in row-major order
    pub fn first_step(&self) -> &[f64] {
        &self.values[..self.nx() * self.ny()]
    }

    /// Set every cell of each zone to the matching entry of `new_values`
    pub fn assign_zones(&mut self, zones: &[Zone], new_values: &[f64]) -> Result<()> {
        ensure!(
            zones.len() == new_values.len(),
            "Got {} values for {} zones",
            new_values.len(),
            zones.len()
        );

        for (zone, &value) in zones.iter().zip(new_values) {
            for &idx in &zone.indices {
                match self.values.get_mut(idx) {
                    Some(cell) => *cell = value,
                    None => bail!(
                        "Zone index {} is outside field '{}' with {} cells",
                        idx,
                        self.item_name,
                        self.values.len()
                    ),
                }
            }
        }

        Ok(())
    }
}
