use crate::manning::ManningField;

/// Cells sharing one roughness value, identified by flat index into the field
#[derive(Debug, Clone, PartialEq)]
pub struct Zone {
    pub value: f64,
    pub indices: Vec<usize>,
}

/// One zone per distinct value in the field, ordered by value
pub fn find_zones(field: &ManningField) -> Vec<Zone> {
    let mut order: Vec<usize> = (0..field.values.len()).collect();
    // Stable sort keeps indices ascending within a zone
    order.sort_by(|&a, &b| field.values[a].total_cmp(&field.values[b]));

    let mut zones: Vec<Zone> = Vec::new();
    for idx in order {
        let value = field.values[idx];
        match zones.last_mut() {
            Some(zone) if zone.value.total_cmp(&value).is_eq() => zone.indices.push(idx),
            _ => zones.push(Zone {
                value,
                indices: vec![idx],
            }),
        }
    }

    zones
}

/// Zone position for every cell of a 2-D grid of values
pub fn zone_index_grid(values: &[f64]) -> (Vec<usize>, usize) {
    let mut distinct: Vec<f64> = values.to_vec();
    distinct.sort_by(f64::total_cmp);
    distinct.dedup_by(|a, b| a.total_cmp(b).is_eq());

    let indices = values
        .iter()
        .map(|v| {
            distinct
                .binary_search_by(|d| d.total_cmp(v))
                .unwrap_or_default()
        })
        .collect();

    (indices, distinct.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manning::tests::grid;

    #[test]
    fn test_find_zones_partitions_field() {
        let field = grid(vec![1.0, 1.0, 2.0, 3.0, 3.0, 3.0], 2, 3);
        let zones = find_zones(&field);

        assert_eq!(zones.len(), 3);
        let mut all: Vec<usize> = zones.iter().flat_map(|z| z.indices.clone()).collect();
        all.sort_unstable();
        assert_eq!(all, vec![0, 1, 2, 3, 4, 5]);

        assert_eq!(zones[0].indices, vec![0, 1]);
        assert_eq!(zones[1].indices, vec![2]);
        assert_eq!(zones[2].indices, vec![3, 4, 5]);
    }

    #[test]
    fn test_find_zones_orders_by_value() {
        let field = grid(vec![32.0, 0.02, 32.0, 5.5], 2, 2);
        let values: Vec<f64> = find_zones(&field).iter().map(|z| z.value).collect();
        assert_eq!(values, vec![0.02, 5.5, 32.0]);
    }

    #[test]
    fn test_find_zones_uniform() {
        let field = grid(vec![7.0; 4], 2, 2);
        let zones = find_zones(&field);
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].indices.len(), 4);
    }

    #[test]
    fn test_zone_index_grid() {
        let (indices, count) = zone_index_grid(&[3.0, 1.0, 3.0, 2.0]);
        assert_eq!(count, 3);
        assert_eq!(indices, vec![2, 0, 2, 1]);
    }
}
