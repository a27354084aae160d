use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use rusqlite::{Row, params};
use uuid::Uuid;

use pawlink_types::models::{Actor, ActorKind, ActorProfile, Pet, Region};

use crate::{Database, OptionalExt, opt_text_col, placeholders, text_col, ts};

const PROFILE_COLUMNS: &str = "id, kind, display_name, avatar, city, village";

impl Database {
    // -- Actor profiles (mirror of the account store) --

    pub fn upsert_actor(&self, profile: &ActorProfile) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO actors (id, kind, display_name, avatar, city, village, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    kind = excluded.kind,
                    display_name = excluded.display_name,
                    avatar = excluded.avatar,
                    city = excluded.city,
                    village = excluded.village",
                params![
                    profile.id.to_string(),
                    profile.kind.as_str(),
                    profile.display_name,
                    profile.avatar,
                    profile.city,
                    profile.village,
                    ts(Utc::now()),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_profile(&self, id: Uuid) -> Result<Option<ActorProfile>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM actors WHERE id = ?1", PROFILE_COLUMNS),
                [id.to_string()],
                map_profile,
            )
            .optional()
        })
    }

    /// Profiles for `actors`, in the same order. Actors the store does not
    /// know get a kind-specific placeholder instead of failing the lookup.
    pub fn resolve_profiles(&self, actors: &[Actor]) -> Result<Vec<ActorProfile>> {
        if actors.is_empty() {
            return Ok(vec![]);
        }

        let found: HashMap<Uuid, ActorProfile> = self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM actors WHERE id IN ({})",
                PROFILE_COLUMNS,
                placeholders(1, actors.len())
            );
            let ids: Vec<String> = actors.iter().map(|a| a.id.to_string()).collect();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(ids.iter()), map_profile)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows.into_iter().map(|p| (p.id, p)).collect())
        })?;

        Ok(actors
            .iter()
            .map(|actor| {
                found
                    .get(&actor.id)
                    .cloned()
                    .unwrap_or_else(|| ActorProfile::unknown(*actor))
            })
            .collect())
    }

    // -- Pets --

    pub fn insert_pet(&self, pet: &Pet) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO pets (id, owner_id, name, species, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    pet.id.to_string(),
                    pet.owner_id.to_string(),
                    pet.name,
                    pet.species.to_lowercase(),
                    ts(Utc::now()),
                ],
            )?;
            Ok(())
        })
    }

    /// Pets whose species is in `species` and whose owner is located in
    /// `region`, in the order they were registered. A region naming a village
    /// also matches owners with no village on file.
    pub fn pets_in_region(&self, region: &Region, species: &[String]) -> Result<Vec<Pet>> {
        if species.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT p.id, p.owner_id, p.name, p.species
                 FROM pets p
                 JOIN actors a ON a.id = p.owner_id
                 WHERE a.kind = ?1 AND a.city = ?2
                   AND (?3 IS NULL OR a.village = ?3 OR a.village IS NULL OR TRIM(a.village) = '')
                   AND LOWER(p.species) IN ({})
                 ORDER BY p.seq",
                placeholders(4, species.len())
            );
            let mut values: Vec<Option<String>> = vec![
                Some(ActorKind::Owner.as_str().to_string()),
                Some(region.city.clone()),
                region.village_name().map(str::to_string),
            ];
            values.extend(species.iter().map(|s| Some(s.trim().to_lowercase())));

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(values.iter()), |row| {
                    Ok(Pet {
                        id: text_col(row, 0)?,
                        owner_id: text_col(row, 1)?,
                        name: row.get(2)?,
                        species: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn map_profile(row: &Row<'_>) -> rusqlite::Result<ActorProfile> {
    Ok(ActorProfile {
        id: text_col(row, 0)?,
        kind: text_col(row, 1)?,
        display_name: row.get(2)?,
        avatar: row.get(3)?,
        city: row.get(4)?,
        village: opt_text_col::<String>(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(db: &Database, name: &str, city: &str, village: Option<&str>) -> Uuid {
        let id = Uuid::new_v4();
        db.upsert_actor(&ActorProfile {
            id,
            kind: ActorKind::Owner,
            display_name: name.into(),
            avatar: None,
            city: Some(city.into()),
            village: village.map(Into::into),
        })
        .unwrap();
        id
    }

    #[test]
    fn test_resolve_profiles_falls_back_for_unknown() {
        let db = Database::open_in_memory().unwrap();
        let known = owner(&db, "Lina", "Gaza", None);
        let unknown = Actor::new(Uuid::new_v4(), ActorKind::Clinic);

        let profiles = db
            .resolve_profiles(&[Actor::new(known, ActorKind::Owner), unknown])
            .unwrap();
        assert_eq!(profiles[0].display_name, "Lina");
        assert_eq!(profiles[1].display_name, "Unknown clinic");
    }

    fn pet(db: &Database, owner_id: Uuid, name: &str, species: &str) {
        db.insert_pet(&Pet {
            id: Uuid::new_v4(),
            owner_id,
            name: name.into(),
            species: species.into(),
        })
        .unwrap();
    }

    fn owners(pets: &[Pet]) -> Vec<Uuid> {
        pets.iter().map(|p| p.owner_id).collect()
    }

    #[test]
    fn test_pets_in_region_village_inclusive() {
        let db = Database::open_in_memory().unwrap();
        let in_village = owner(&db, "A", "Nablus", Some("Balata"));
        let no_village = owner(&db, "B", "Nablus", None);
        let blank_village = owner(&db, "C", "Nablus", Some(""));
        let other_village = owner(&db, "D", "Nablus", Some("Askar"));
        let other_city = owner(&db, "E", "Jenin", Some("Balata"));
        for id in [in_village, no_village, blank_village, other_village, other_city] {
            pet(&db, id, "Luna", "cat");
        }
        let dogs = vec!["dog".to_string()];
        let cats = vec!["cat".to_string()];

        let found = owners(&db.pets_in_region(&Region::village("Nablus", "Balata"), &cats).unwrap());
        assert_eq!(found, vec![in_village, no_village, blank_village]);

        let city_wide = db.pets_in_region(&Region::city("Nablus"), &cats).unwrap();
        assert_eq!(city_wide.len(), 4);
        assert!(db.pets_in_region(&Region::city("Nablus"), &dogs).unwrap().is_empty());
        assert!(db.pets_in_region(&Region::city("Nablus"), &[]).unwrap().is_empty());
    }

    #[test]
    fn test_pets_in_region_filters_species_and_orders() {
        let db = Database::open_in_memory().unwrap();
        let o = owner(&db, "A", "Gaza", None);
        for (name, species) in [("Rex", "Dog"), ("Tom", "cat"), ("Max", "dog")] {
            pet(&db, o, name, species);
        }
        // Not an owner, so never targeted
        let clinic = Uuid::new_v4();
        db.upsert_actor(&ActorProfile {
            id: clinic,
            kind: ActorKind::Clinic,
            display_name: "Vet".into(),
            avatar: None,
            city: Some("Gaza".into()),
            village: None,
        })
        .unwrap();
        pet(&db, clinic, "Ward", "dog");

        let dogs = db.pets_in_region(&Region::city("Gaza"), &[" DOG ".to_string()]).unwrap();
        let names: Vec<&str> = dogs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Rex", "Max"]);
    }

    #[test]
    fn test_pets_in_region_large_city() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..40_000 {
            let id = owner(&db, &format!("O{}", i), "Gaza", None);
            if i % 10_000 == 0 {
                pet(&db, id, "Rex", "dog");
            }
        }

        let pets = db.pets_in_region(&Region::city("Gaza"), &["dog".to_string()]).unwrap();
        assert_eq!(pets.len(), 4);
    }
}
