use crate::{error::AppError, models::trip::Price};

#[derive(Debug, Clone, PartialEq)]
pub struct FareTable {
    pub per_km: f64,
    pub minimum: f64,
    pub currency: String,
}

impl Default for FareTable {
    fn default() -> Self {
        Self {
            per_km: 5.0,
            minimum: 5.0,
            currency: "BRL".into(),
        }
    }
}

impl FareTable {
    pub fn quote(&self, distance_km: f64) -> Result<Price, AppError> {
        if !distance_km.is_finite() || distance_km < 0.0 {
            return Err(AppError::InvalidDistance);
        }
        let raw = (distance_km * self.per_km).max(self.minimum);
        Ok(Price {
            amount: (raw * 100.0).round() / 100.0,
            currency: self.currency.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_rounds_to_cents() {
        let fares = FareTable::default();
        assert_eq!(fares.quote(3.3334).expect("quote").amount, 16.67);
    }

    #[test]
    fn short_rides_pay_the_minimum() {
        let fares = FareTable::default();
        let price = fares.quote(0.2).expect("quote");
        assert_eq!(price.amount, 5.0);
        assert_eq!(price.currency, "BRL");
    }

    #[test]
    fn nonsense_distances_are_rejected() {
        let fares = FareTable::default();
        assert!(matches!(fares.quote(-1.0), Err(AppError::InvalidDistance)));
        assert!(matches!(fares.quote(f64::NAN), Err(AppError::InvalidDistance)));
    }
}
