use rand::rngs::StdRng;
use rand::{seq::IndexedRandom, Rng, SeedableRng};
use std::collections::BTreeSet;

use crate::models::{PackingRecord, TripProfile};

pub const TRAVEL_TYPES: &[&str] = &["beach", "mountain", "city", "business"];
pub const CLIMATES: &[&str] = &["hot", "cold", "temperate"];

const BEACH_ITEMS: &[&str] = &["swimsuit", "sunscreen", "sunglasses", "shorts", "towel"];
const MOUNTAIN_ITEMS: &[&str] = &["jacket", "boots", "gloves", "beanie", "hiking backpack"];
const CITY_ITEMS: &[&str] = &["comfortable shoes", "guidebook", "backpack", "camera"];
const BUSINESS_ITEMS: &[&str] = &["suit", "laptop", "charger", "documents"];

fn items_for(travel_type: &str) -> &'static [&'static str] {
    match travel_type {
        "beach" => BEACH_ITEMS,
        "mountain" => MOUNTAIN_ITEMS,
        "city" => CITY_ITEMS,
        "business" => BUSINESS_ITEMS,
        _ => &[],
    }
}

/// Generate a deterministic synthetic training corpus
///
/// Items follow fixed rules: each travel type has its own kit, every trip
/// packs a toothbrush and a charger, trips over 5 days add laundry
/// detergent, cold climates add a coat and hot climates a hat.
pub fn generate(count: usize, seed: u64) -> Vec<PackingRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count).map(|_| generate_one(&mut rng)).collect()
}

fn generate_one(rng: &mut StdRng) -> PackingRecord {
    let travel_type = TRAVEL_TYPES.choose(rng).copied().unwrap_or("city");
    let climate = CLIMATES.choose(rng).copied().unwrap_or("temperate");
    let duration: u32 = rng.random_range(2..=14);

    let mut items: BTreeSet<String> = items_for(travel_type).iter().map(|s| s.to_string()).collect();
    if duration > 5 {
        items.insert("laundry detergent".to_string());
    }
    items.insert("toothbrush".to_string());
    items.insert("charger".to_string());

    match climate {
        "cold" => {
            items.insert("coat".to_string());
        }
        "hot" => {
            items.insert("hat".to_string());
        }
        _ => {}
    }

    PackingRecord {
        profile: TripProfile::new(travel_type, climate, duration),
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_deterministic() {
        assert_eq!(generate(50, 7), generate(50, 7));
    }

    #[test]
    fn test_generated_records_follow_rules() {
        for record in generate(200, 42) {
            assert!(TRAVEL_TYPES.contains(&record.profile.travel_type.as_str()));
            assert!(CLIMATES.contains(&record.profile.climate.as_str()));
            assert!((2..=14).contains(&record.profile.duration));
            assert!(record.items.contains("toothbrush"));
            assert!(record.items.contains("charger"));
            assert_eq!(
                record.items.contains("laundry detergent"),
                record.profile.duration > 5
            );
            assert_eq!(record.items.contains("coat"), record.profile.climate == "cold");
            assert_eq!(record.items.contains("hat"), record.profile.climate == "hot");
            if record.profile.travel_type == "beach" {
                assert!(record.items.contains("sunscreen"));
            }
        }
    }
}
