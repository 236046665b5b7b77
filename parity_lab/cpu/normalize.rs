use crate::cpu::Scalar;

/// Square-root gamma compression. Negative inputs clamp to zero.
pub fn sqrt_normalize(values: &mut [Scalar]) {
    for value in values {
        *value = value.max(0.0).sqrt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compresses_in_place() {
        let mut values = [0.0, 0.25, 1.0, 4.0, -1.0];
        sqrt_normalize(&mut values);
        assert_eq!(values, [0.0, 0.5, 1.0, 2.0, 0.0]);
    }
}
