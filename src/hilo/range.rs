use serde_json::Value;

use crate::store::Body;

const MAX_FIELD: &str = "max";
const LEGACY_FIELDS: [&str; 2] = ["ServerHi", "serverHi"];

/// Ids held locally for one entity type: `(last_id, current_max]` is still unused
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RangeState {
    pub(crate) last_id: u64,
    pub(crate) current_max: u64,
}

impl RangeState {
    /// Hand out the next id if the held range has one left
    pub(crate) fn try_next(&mut self) -> Option<u64> {
        if self.last_id < self.current_max {
            self.last_id += 1;
            Some(self.last_id)
        } else {
            None
        }
    }

    /// Switch to a freshly reserved range and hand out its first id
    pub(crate) fn adopt(&mut self, reservation: Reservation) -> u64 {
        self.current_max = reservation.max;
        self.last_id = reservation.last_max + 1;
        self.last_id
    }
}

/// A range `(last_max, max]` persisted to the range document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Reservation {
    pub(crate) last_max: u64,
    pub(crate) max: u64,
}

/// The range document after migrating any legacy `ServerHi` field
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RangeDocument {
    pub(crate) max: u64,
    pub(crate) migrated: bool,
    rest: Body,
}

impl RangeDocument {
    /// Normalize a stored body. A legacy `ServerHi` takes precedence over `max`
    /// and is converted with the current capacity.
    pub(crate) fn parse(body: &Body, capacity: u64) -> Result<Self, String> {
        let mut rest = body.clone();
        let legacy: Vec<Value> = LEGACY_FIELDS
            .iter()
            .filter_map(|field| rest.remove(*field))
            .collect();
        let legacy = legacy.into_iter().find(|value| !value.is_null());
        let stored_max = rest.remove(MAX_FIELD);

        if let Some(server_hi) = legacy {
            let server_hi = as_counter(&server_hi, "ServerHi")?;
            let max = server_hi
                .saturating_sub(1)
                .checked_mul(capacity)
                .ok_or_else(|| format!("ServerHi {} overflows with capacity {}", server_hi, capacity))?;
            return Ok(Self { max, migrated: true, rest });
        }

        match stored_max {
            Some(value) => Ok(Self {
                max: as_counter(&value, MAX_FIELD)?,
                migrated: false,
                rest,
            }),
            None => Err("neither 'max' nor 'ServerHi' is present".to_string()),
        }
    }

    /// Advance by `capacity`, returning the reservation and the body to persist
    pub(crate) fn reserve(self, capacity: u64) -> Result<(Reservation, Body), String> {
        let max = self
            .max
            .checked_add(capacity)
            .ok_or_else(|| format!("max {} overflows with capacity {}", self.max, capacity))?;
        let mut body = self.rest;
        body.insert(MAX_FIELD.to_string(), Value::from(max));
        Ok((Reservation { last_max: self.max, max }, body))
    }

    /// Body of a range document that does not exist yet
    pub(crate) fn initial(capacity: u64) -> (Reservation, Body) {
        let mut body = Body::new();
        body.insert(MAX_FIELD.to_string(), Value::from(capacity));
        (Reservation { last_max: 0, max: capacity }, body)
    }
}

fn as_counter(value: &Value, field: &str) -> Result<u64, String> {
    value
        .as_u64()
        .ok_or_else(|| format!("'{}' must be a non-negative integer, got {}", field, value))
}
