//! Pixel store
//!
//! Read and write operations over the grid. Multi-statement writes run in
//! one transaction; the ownership-aware path reads the current owner and
//! writes the new state as a single atomic unit, so no other writer can
//! act on the intermediate state.

use chrono::{DateTime, Utc};
use rusqlite::params;
use tracing::debug;

use crate::models::{Pixel, PixelStatus, GRID_PIXELS};
use crate::storage::db::{self, Database, Value};
use crate::storage::error::{StoreError, StoreResult};

const SELECT_PIXEL: &str = "SELECT id, status, color, url, owner_id, updated_at FROM pixels";

const UPDATE_PIXEL: &str = "UPDATE pixels SET status = ?1, color = ?2, url = ?3, \
     owner_id = ?4, updated_at = ?5 WHERE id = ?6";

/// Typed operations over the `pixels` table
#[derive(Clone)]
pub struct PixelStore {
    db: Database,
}

impl PixelStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Snapshot of the whole grid, ordered by id ascending.
    ///
    /// Returns exactly `GRID_PIXELS` entries once the store is
    /// bootstrapped, regardless of how many pixels are taken.
    pub fn read_all(&self) -> StoreResult<Vec<Pixel>> {
        let rs = self.db.query(
            "read grid",
            &format!("{SELECT_PIXEL} ORDER BY id ASC"),
            [],
        )?;
        rs.rows.into_iter().map(pixel_from_row).collect()
    }

    /// A single pixel by id
    pub fn get(&self, id: i64) -> StoreResult<Pixel> {
        validate_id(id)?;
        let rs = self.db.query(
            "read pixel",
            &format!("{SELECT_PIXEL} WHERE id = ?1"),
            params![id],
        )?;
        match rs.rows.into_iter().next() {
            Some(row) => pixel_from_row(row),
            None => Err(StoreError::NotFound("pixel")),
        }
    }

    /// Number of pixel rows present
    pub fn count(&self) -> StoreResult<i64> {
        let rs = self
            .db
            .query("count pixels", "SELECT COUNT(*) FROM pixels", [])?;
        rs.rows
            .first()
            .and_then(|row| row.first())
            .and_then(|v| v.as_i64())
            .ok_or_else(|| StoreError::DataIntegrity("pixel count is not an integer".to_string()))
    }

    /// Unconditional update with no ownership check; privileged callers
    /// only. Fails `NotFound` when the row does not exist.
    pub fn update(&self, pixel: &Pixel) -> StoreResult<()> {
        let row = WriteRow::from_pixel(pixel)?;
        self.db.with_txn("update pixel", |tx| {
            let res = db::exec(
                tx,
                "write pixel",
                UPDATE_PIXEL,
                params![
                    row.status,
                    row.color,
                    row.url,
                    row.owner_id,
                    row.updated_at,
                    pixel.id
                ],
            )?;
            if res.rows_affected == 0 {
                return Err(StoreError::NotFound("pixel"));
            }
            Ok(())
        })
    }

    /// Ownership-checked update on behalf of `user_id`.
    ///
    /// Claiming a pixel owned by a different user fails
    /// `OwnedByAnotherUser` with no write, as does releasing one. Claiming
    /// sets the owner to `user_id`; releasing clears it along with color
    /// and url.
    pub fn update_for_user(&self, user_id: i64, pixel: &Pixel) -> StoreResult<()> {
        let mut row = WriteRow::from_pixel(pixel)?;
        row.owner_id = match pixel.status {
            PixelStatus::Taken => Some(user_id),
            PixelStatus::Free => None,
        };

        self.db.with_txn("update pixel for user", |tx| {
            let rs = db::query(
                tx,
                "read pixel owner",
                "SELECT owner_id FROM pixels WHERE id = ?1",
                params![pixel.id],
            )?;
            let current = match rs.rows.first() {
                Some(r) => r.first().and_then(|v| v.as_i64()),
                None => return Err(StoreError::NotFound("pixel")),
            };

            if let Some(owner) = current {
                if owner != user_id {
                    debug!(
                        pixel = pixel.id,
                        owner,
                        user = user_id,
                        "rejected write to foreign-owned pixel"
                    );
                    return Err(StoreError::OwnedByAnotherUser { pixel_id: pixel.id });
                }
            }

            let res = db::exec(
                tx,
                "write pixel",
                UPDATE_PIXEL,
                params![
                    row.status,
                    row.color,
                    row.url,
                    row.owner_id,
                    row.updated_at,
                    pixel.id
                ],
            )?;
            if res.rows_affected == 0 {
                return Err(StoreError::NotFound("pixel"));
            }
            Ok(())
        })
    }
}

/// Column values for a pixel write, normalized per status: a taken pixel
/// keeps its color, url, and owner; anything else becomes a fully-cleared
/// free row. Every write stamps the current time.
struct WriteRow {
    status: &'static str,
    color: String,
    url: String,
    owner_id: Option<i64>,
    updated_at: i64,
}

impl WriteRow {
    fn from_pixel(pixel: &Pixel) -> StoreResult<Self> {
        validate_id(pixel.id)?;
        let updated_at = Utc::now().timestamp_millis();

        match pixel.status {
            PixelStatus::Taken => {
                let color = pixel.color.as_deref().unwrap_or("");
                let url = pixel.url.as_deref().unwrap_or("");
                if color.is_empty() || url.is_empty() {
                    return Err(StoreError::Validation(
                        "a taken pixel requires a color and a url".to_string(),
                    ));
                }
                Ok(Self {
                    status: "taken",
                    color: color.to_string(),
                    url: url.to_string(),
                    owner_id: pixel.owner_id,
                    updated_at,
                })
            }
            PixelStatus::Free => Ok(Self {
                status: "free",
                color: String::new(),
                url: String::new(),
                owner_id: None,
                updated_at,
            }),
        }
    }
}

fn validate_id(id: i64) -> StoreResult<()> {
    if !(0..GRID_PIXELS).contains(&id) {
        return Err(StoreError::Validation(format!(
            "pixel id {id} is outside the grid (0..{GRID_PIXELS})"
        )));
    }
    Ok(())
}

fn pixel_from_row(row: Vec<Value>) -> StoreResult<Pixel> {
    let id = row
        .first()
        .and_then(|v| v.as_i64())
        .ok_or_else(|| StoreError::DataIntegrity("pixel id is not an integer".to_string()))?;

    let status_text = row
        .get(1)
        .and_then(|v| v.as_str())
        .ok_or_else(|| StoreError::DataIntegrity(format!("pixel {id} has no status")))?;
    let status = PixelStatus::parse(status_text).ok_or_else(|| {
        StoreError::DataIntegrity(format!("pixel {id} has unknown status '{status_text}'"))
    })?;

    let color = row
        .get(2)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let url = row
        .get(3)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let owner_id = row.get(4).and_then(|v| v.as_i64());

    let updated_at = match row.get(5) {
        None | Some(Value::Null) => None,
        Some(Value::Integer(ms)) => Some(DateTime::from_timestamp_millis(*ms).ok_or_else(
            || StoreError::DataIntegrity(format!("pixel {id} has an invalid updated_at")),
        )?),
        Some(_) => {
            return Err(StoreError::DataIntegrity(format!(
                "pixel {id} has a non-integer updated_at"
            )))
        }
    };

    Ok(Pixel {
        id,
        status,
        color,
        url,
        owner_id,
        updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::{self, CancelToken};

    /// Store over a fully bootstrapped (seeded) grid
    fn seeded_store() -> PixelStore {
        let db = Database::open_in_memory().unwrap();
        schema::bootstrap(&db, &CancelToken::new()).unwrap();
        PixelStore::new(db)
    }

    /// Store over migrated tables with no seed rows; fast, for paths that
    /// never touch real grid data
    fn empty_store() -> PixelStore {
        let db = Database::open_in_memory().unwrap();
        db.with_txn("migrate", |tx| schema::migrate(tx)).unwrap();
        PixelStore::new(db)
    }

    #[test]
    fn test_validation_rejects_out_of_range_ids() {
        let store = empty_store();

        for id in [-1, GRID_PIXELS, GRID_PIXELS + 5] {
            let err = store.update(&Pixel::free(id)).unwrap_err();
            assert!(matches!(err, StoreError::Validation(_)), "id {id}");
        }

        let err = store.get(-1).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn test_validation_rejects_taken_without_color_or_url() {
        let store = empty_store();

        let mut pixel = Pixel::taken(5, "", "https://example.com");
        let err = store.update(&pixel).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        pixel = Pixel::taken(5, "#123456", "");
        let err = store.update_for_user(1, &pixel).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        pixel = Pixel::taken(5, "#123456", "https://example.com");
        pixel.color = None;
        let err = store.update(&pixel).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn test_update_missing_row_is_not_found() {
        let store = empty_store();
        let err = store
            .update(&Pixel::taken(5, "#123456", "https://example.com"))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound("pixel")));

        let err = store.get(5).unwrap_err();
        assert!(matches!(err, StoreError::NotFound("pixel")));
    }

    #[test]
    fn test_read_all_returns_full_ordered_free_grid() {
        let store = seeded_store();

        let grid = store.read_all().unwrap();
        assert_eq!(grid.len(), GRID_PIXELS as usize);
        assert!(grid.iter().enumerate().all(|(i, p)| p.id == i as i64));
        assert!(grid.iter().all(|p| p.is_free()
            && p.color.is_none()
            && p.url.is_none()
            && p.owner_id.is_none()
            && p.updated_at.is_none()));

        // Taking pixels does not change length or order.
        store
            .update(&Pixel::taken(3, "#ff0000", "https://example.com"))
            .unwrap();
        let grid = store.read_all().unwrap();
        assert_eq!(grid.len(), GRID_PIXELS as usize);
        assert_eq!(grid[3].status, PixelStatus::Taken);
        assert!(grid.iter().enumerate().all(|(i, p)| p.id == i as i64));
    }

    #[test]
    fn test_unconditional_update_stamps_and_normalizes() {
        let store = seeded_store();

        let mut pixel = Pixel::taken(42, "#123456", "https://example.com");
        pixel.owner_id = Some(9);
        store.update(&pixel).unwrap();

        let stored = store.get(42).unwrap();
        assert_eq!(stored.status, PixelStatus::Taken);
        assert_eq!(stored.color.as_deref(), Some("#123456"));
        assert_eq!(stored.url.as_deref(), Some("https://example.com"));
        assert_eq!(stored.owner_id, Some(9));
        assert!(stored.updated_at.is_some());

        // Freeing clears everything, whatever the input carried.
        let mut released = Pixel::free(42);
        released.color = Some("#123456".to_string());
        released.owner_id = Some(9);
        store.update(&released).unwrap();

        let stored = store.get(42).unwrap();
        assert!(stored.is_free());
        assert!(stored.color.is_none());
        assert!(stored.url.is_none());
        assert!(stored.owner_id.is_none());
        assert!(stored.updated_at.is_some());
    }

    #[test]
    fn test_ownership_transfer_scenario() {
        let store = seeded_store();
        let (user_a, user_b) = (1, 2);

        // A claims pixel 5.
        store
            .update_for_user(user_a, &Pixel::taken(5, "#123456", "https://example.com"))
            .unwrap();
        let stored = store.get(5).unwrap();
        assert_eq!(stored.owner_id, Some(user_a));

        // B can neither claim nor free it.
        let err = store
            .update_for_user(user_b, &Pixel::taken(5, "#654321", "https://other.example"))
            .unwrap_err();
        assert!(matches!(err, StoreError::OwnedByAnotherUser { pixel_id: 5 }));
        let err = store.update_for_user(user_b, &Pixel::free(5)).unwrap_err();
        assert!(matches!(err, StoreError::OwnedByAnotherUser { pixel_id: 5 }));

        // Unchanged after the rejected writes.
        let stored = store.get(5).unwrap();
        assert_eq!(stored.owner_id, Some(user_a));
        assert_eq!(stored.color.as_deref(), Some("#123456"));

        // A recolors its own pixel; ownership is retained.
        store
            .update_for_user(user_a, &Pixel::taken(5, "#abcdef", "https://example.com"))
            .unwrap();
        let stored = store.get(5).unwrap();
        assert_eq!(stored.color.as_deref(), Some("#abcdef"));
        assert_eq!(stored.owner_id, Some(user_a));

        // A frees it; B can now claim.
        store.update_for_user(user_a, &Pixel::free(5)).unwrap();
        let stored = store.get(5).unwrap();
        assert!(stored.is_free());
        assert!(stored.owner_id.is_none());

        store
            .update_for_user(user_b, &Pixel::taken(5, "#00ff00", "https://b.example"))
            .unwrap();
        assert_eq!(store.get(5).unwrap().owner_id, Some(user_b));
    }
}
