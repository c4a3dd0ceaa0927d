use std::collections::HashMap;

use sqlx::{PgPool, Row};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{parse_tags, serialize_tags, CalculationType, Listing, ListingGroup};
use crate::error::{AppError, AppResult};

#[derive(Default)]
struct DirectoryState {
    listings: HashMap<Uuid, Listing>,
    groups: HashMap<Uuid, ListingGroup>,
    loaded: bool,
}

/// In-memory view of listings and groups, read-only during a build.
///
/// Explicitly constructed and injectable; `reload()` is the only way the
/// contents change, so tests can substitute a fresh instance per case.
pub struct ListingDirectory {
    inner: RwLock<DirectoryState>,
}

impl Default for ListingDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingDirectory {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(DirectoryState::default()),
        }
    }

    /// Directory pre-populated without a database, for tests.
    pub fn with_data(listings: Vec<Listing>, groups: Vec<ListingGroup>) -> Self {
        let state = DirectoryState {
            listings: listings.into_iter().map(|l| (l.id, l)).collect(),
            groups: groups.into_iter().map(|g| (g.id, g)).collect(),
            loaded: true,
        };
        Self {
            inner: RwLock::new(state),
        }
    }

    /// Replace the whole view from storage.
    pub async fn reload(&self, pool: &PgPool) -> AppResult<()> {
        let listing_rows = sqlx::query(
            "SELECT id, owner_id, name, active, pm_percentage, waive_commission,
                    waive_commission_until, disregard_tax, airbnb_pass_through_tax,
                    cleaning_fee_pass_through, is_cohost_on_airbnb,
                    guest_paid_damage_coverage, include_child_listings,
                    default_cleaning_fee, default_pet_fee, tags, group_id,
                    calculation_type
             FROM listings",
        )
        .fetch_all(pool)
        .await?;

        let group_rows = sqlx::query(
            "SELECT id, name, tags, default_calculation_type FROM listing_groups",
        )
        .fetch_all(pool)
        .await?;

        let mut listings = HashMap::new();
        for row in listing_rows {
            let listing = listing_from_row(&row)?;
            listings.insert(listing.id, listing);
        }
        let mut groups = HashMap::new();
        for row in group_rows {
            let group = group_from_row(&row)?;
            groups.insert(group.id, group);
        }

        let mut state = self.inner.write().await;
        state.listings = listings;
        state.groups = groups;
        state.loaded = true;
        tracing::debug!(
            listings = state.listings.len(),
            groups = state.groups.len(),
            "listing directory reloaded"
        );
        Ok(())
    }

    pub async fn ensure_loaded(&self, pool: &PgPool) -> AppResult<()> {
        if self.inner.read().await.loaded {
            return Ok(());
        }
        self.reload(pool).await
    }

    pub async fn get(&self, id: Uuid) -> Option<Listing> {
        self.inner.read().await.listings.get(&id).cloned()
    }

    pub async fn group(&self, id: Uuid) -> Option<ListingGroup> {
        self.inner.read().await.groups.get(&id).cloned()
    }

    pub async fn all_listings(&self) -> Vec<Listing> {
        let mut listings: Vec<Listing> =
            self.inner.read().await.listings.values().cloned().collect();
        listings.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        listings
    }

    pub async fn listings_for_owner(&self, owner_id: &str) -> Vec<Listing> {
        self.all_listings()
            .await
            .into_iter()
            .filter(|l| l.owner_id == owner_id)
            .collect()
    }

    pub async fn listings_with_tag(&self, owner_id: &str, tag: &str) -> Vec<Listing> {
        let tag = tag.trim();
        self.listings_for_owner(owner_id)
            .await
            .into_iter()
            .filter(|l| l.tags.contains(tag))
            .collect()
    }

    pub async fn listings_in_group(&self, group_id: Uuid) -> Vec<Listing> {
        self.all_listings()
            .await
            .into_iter()
            .filter(|l| l.group_id == Some(group_id))
            .collect()
    }
}

fn listing_from_row(row: &sqlx::postgres::PgRow) -> AppResult<Listing> {
    let calculation_type: Option<String> = row.try_get("calculation_type")?;
    let calculation_type = match calculation_type {
        Some(raw) => Some(CalculationType::parse(&raw)?),
        None => None,
    };
    let tags: Option<String> = row.try_get("tags")?;
    Ok(Listing {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        name: row.try_get("name")?,
        active: row.try_get("active")?,
        pm_percentage: row.try_get("pm_percentage")?,
        waive_commission: row.try_get("waive_commission")?,
        waive_commission_until: row.try_get("waive_commission_until")?,
        disregard_tax: row.try_get("disregard_tax")?,
        airbnb_pass_through_tax: row.try_get("airbnb_pass_through_tax")?,
        cleaning_fee_pass_through: row.try_get("cleaning_fee_pass_through")?,
        is_cohost_on_airbnb: row.try_get("is_cohost_on_airbnb")?,
        guest_paid_damage_coverage: row.try_get("guest_paid_damage_coverage")?,
        include_child_listings: row.try_get("include_child_listings")?,
        default_cleaning_fee: row.try_get("default_cleaning_fee")?,
        default_pet_fee: row.try_get("default_pet_fee")?,
        tags: parse_tags(tags.as_deref().unwrap_or_default()),
        group_id: row.try_get("group_id")?,
        calculation_type,
    })
}

fn group_from_row(row: &sqlx::postgres::PgRow) -> AppResult<ListingGroup> {
    let raw_type: String = row.try_get("default_calculation_type")?;
    let tags: Option<String> = row.try_get("tags")?;
    Ok(ListingGroup {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        tags: parse_tags(tags.as_deref().unwrap_or_default()),
        default_calculation_type: CalculationType::parse(&raw_type)?,
    })
}

/// Patch of administrative policy edits; only provided fields change.
#[derive(Debug, Default, Clone)]
pub struct ListingPolicyPatch {
    pub pm_percentage: Option<f64>,
    pub waive_commission: Option<bool>,
    pub waive_commission_until: Option<Option<chrono::NaiveDate>>,
    pub disregard_tax: Option<bool>,
    pub airbnb_pass_through_tax: Option<bool>,
    pub cleaning_fee_pass_through: Option<bool>,
    pub is_cohost_on_airbnb: Option<bool>,
    pub guest_paid_damage_coverage: Option<bool>,
    pub include_child_listings: Option<bool>,
    pub default_cleaning_fee: Option<f64>,
    pub default_pet_fee: Option<f64>,
    pub tags: Option<std::collections::BTreeSet<String>>,
    pub calculation_type: Option<Option<CalculationType>>,
}

pub async fn update_listing_policy(
    pool: &PgPool,
    id: Uuid,
    patch: &ListingPolicyPatch,
) -> AppResult<()> {
    let result = sqlx::query(
        "UPDATE listings SET
            pm_percentage = COALESCE($2, pm_percentage),
            waive_commission = COALESCE($3, waive_commission),
            waive_commission_until = CASE WHEN $4 THEN $5 ELSE waive_commission_until END,
            disregard_tax = COALESCE($6, disregard_tax),
            airbnb_pass_through_tax = COALESCE($7, airbnb_pass_through_tax),
            cleaning_fee_pass_through = COALESCE($8, cleaning_fee_pass_through),
            is_cohost_on_airbnb = COALESCE($9, is_cohost_on_airbnb),
            guest_paid_damage_coverage = COALESCE($10, guest_paid_damage_coverage),
            include_child_listings = COALESCE($11, include_child_listings),
            default_cleaning_fee = COALESCE($12, default_cleaning_fee),
            default_pet_fee = COALESCE($13, default_pet_fee),
            tags = COALESCE($14, tags),
            calculation_type = CASE WHEN $15 THEN $16 ELSE calculation_type END,
            updated_at = now()
         WHERE id = $1",
    )
    .bind(id)
    .bind(patch.pm_percentage)
    .bind(patch.waive_commission)
    .bind(patch.waive_commission_until.is_some())
    .bind(patch.waive_commission_until.clone().flatten())
    .bind(patch.disregard_tax)
    .bind(patch.airbnb_pass_through_tax)
    .bind(patch.cleaning_fee_pass_through)
    .bind(patch.is_cohost_on_airbnb)
    .bind(patch.guest_paid_damage_coverage)
    .bind(patch.include_child_listings)
    .bind(patch.default_cleaning_fee)
    .bind(patch.default_pet_fee)
    .bind(patch.tags.as_ref().map(serialize_tags))
    .bind(patch.calculation_type.is_some())
    .bind(
        patch
            .calculation_type
            .clone()
            .flatten()
            .map(|ct| ct.as_str().to_string()),
    )
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Listing {id} not found.")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use uuid::Uuid;

    use super::ListingDirectory;
    use crate::domain::{CalculationType, Listing, ListingGroup};

    fn listing(owner: &str, name: &str, tags: &[&str], group: Option<Uuid>) -> Listing {
        Listing {
            id: Uuid::new_v4(),
            owner_id: owner.to_string(),
            name: name.to_string(),
            active: true,
            pm_percentage: 15.0,
            waive_commission: false,
            waive_commission_until: None,
            disregard_tax: false,
            airbnb_pass_through_tax: false,
            cleaning_fee_pass_through: false,
            is_cohost_on_airbnb: false,
            guest_paid_damage_coverage: false,
            include_child_listings: false,
            default_cleaning_fee: 150.0,
            default_pet_fee: 0.0,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            group_id: group,
            calculation_type: None,
        }
    }

    #[tokio::test]
    async fn directory_filters_by_owner_tag_and_group() {
        let group_id = Uuid::new_v4();
        let directory = ListingDirectory::with_data(
            vec![
                listing("o1", "Alpha", &["beach"], Some(group_id)),
                listing("o1", "Bravo", &["city"], None),
                listing("o2", "Charlie", &["beach"], None),
            ],
            vec![ListingGroup {
                id: group_id,
                name: "Coastal".to_string(),
                tags: BTreeSet::new(),
                default_calculation_type: CalculationType::Calendar,
            }],
        );

        assert_eq!(directory.listings_for_owner("o1").await.len(), 2);
        let tagged = directory.listings_with_tag("o1", "beach").await;
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].name, "Alpha");
        assert_eq!(directory.listings_in_group(group_id).await.len(), 1);
        assert!(directory.group(group_id).await.is_some());
    }
}
