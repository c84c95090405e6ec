use std::collections::BTreeMap;

use deck_terminal::catalog::{
    ALL, Catalog, FilterConfig, OwnershipMap, OwnershipRecord, Unit, cycle_option, filter_units,
    nation_options,
};
use deck_terminal::faction::{FactionRule, FactionTable};

fn unit(id: &str, name: &str, nation: &str, unit_type: &str, abilities: &str) -> Unit {
    Unit {
        id: id.to_string(),
        name: name.to_string(),
        nation: nation.to_string(),
        unit_type: unit_type.to_string(),
        year: None,
        points: 10,
        set_name: String::new(),
        rarity: String::new(),
        abilities: abilities.to_string(),
        stats: BTreeMap::new(),
    }
}

fn catalog() -> Catalog {
    Catalog::from(vec![
        unit("tiger", "Tiger I", "Germany", "Vehicle", "Heavy Armor"),
        unit("sherman", "Sherman", "United States", "Vehicle", ""),
        unit("grenadier", "Grenadier", "Germany", "Soldier", ""),
        unit("commando", "Commando", "United Kingdom", "Soldier", "Stealth"),
        unit("zero", "A6M Zero", "Japan", "Aircraft", "Dogfighter"),
        unit("ghost", "Ghost Army", "Atlantis", "Soldier", ""),
    ])
}

fn ids(units: &[&Unit]) -> Vec<String> {
    units.iter().map(|u| u.id.clone()).collect()
}

#[test]
fn default_filters_return_whole_catalog_in_order() {
    let catalog = catalog();
    let out = filter_units(&catalog, &FilterConfig::default(), None, &FactionTable::default());
    assert_eq!(
        ids(&out),
        vec!["tiger", "sherman", "grenadier", "commando", "zero", "ghost"]
    );
}

#[test]
fn search_matches_name_or_abilities_case_insensitively() {
    let catalog = catalog();
    let filters = FilterConfig {
        search_text: "ARMOR".to_string(),
        ..FilterConfig::default()
    };
    let out = filter_units(&catalog, &filters, None, &FactionTable::default());
    assert_eq!(ids(&out), vec!["tiger"]);

    let filters = FilterConfig {
        search_text: "comm".to_string(),
        ..FilterConfig::default()
    };
    let out = filter_units(&catalog, &filters, None, &FactionTable::default());
    assert_eq!(ids(&out), vec!["commando"]);
}

#[test]
fn search_keeps_surrounding_spaces_in_the_needle() {
    let catalog = catalog();
    let filters = FilterConfig {
        search_text: " i".to_string(),
        ..FilterConfig::default()
    };
    let out = filter_units(&catalog, &filters, None, &FactionTable::default());
    assert_eq!(ids(&out), vec!["tiger"]);

    let filters = FilterConfig {
        search_text: "i".to_string(),
        ..FilterConfig::default()
    };
    let out = filter_units(&catalog, &filters, None, &FactionTable::default());
    assert_eq!(ids(&out), vec!["tiger", "grenadier", "zero"]);

    let filters = FilterConfig {
        search_text: "   ".to_string(),
        ..FilterConfig::default()
    };
    let out = filter_units(&catalog, &filters, None, &FactionTable::default());
    assert_eq!(out.len(), 6);
}

#[test]
fn nation_and_type_stages_compose() {
    let catalog = catalog();
    let filters = FilterConfig {
        nation: "Germany".to_string(),
        unit_type: "Soldier".to_string(),
        ..FilterConfig::default()
    };
    let out = filter_units(&catalog, &filters, None, &FactionTable::default());
    assert_eq!(ids(&out), vec!["grenadier"]);
}

#[test]
fn faction_stage_drops_other_side_and_unknown_nations() {
    let catalog = catalog();
    let axis = FilterConfig {
        faction_rule: FactionRule::AxisOnly,
        ..FilterConfig::default()
    };
    let out = filter_units(&catalog, &axis, None, &FactionTable::default());
    assert_eq!(ids(&out), vec!["tiger", "grenadier", "zero"]);

    let allies = FilterConfig {
        faction_rule: FactionRule::AlliesOnly,
        ..FilterConfig::default()
    };
    let out = filter_units(&catalog, &allies, None, &FactionTable::default());
    assert_eq!(ids(&out), vec!["sherman", "commando"]);
}

#[test]
fn injected_faction_table_changes_membership() {
    let catalog = catalog();
    let table = FactionTable::from_sets(&["Atlantis"], &["Japan"]);
    let axis = FilterConfig {
        faction_rule: FactionRule::AxisOnly,
        ..FilterConfig::default()
    };
    let out = filter_units(&catalog, &axis, None, &table);
    assert_eq!(ids(&out), vec!["ghost"]);
}

#[test]
fn owned_only_needs_an_owned_record() {
    let catalog = catalog();
    let filters = FilterConfig {
        owned_only: true,
        ..FilterConfig::default()
    };
    assert!(filter_units(&catalog, &filters, None, &FactionTable::default()).is_empty());

    let mut ownership = OwnershipMap::new();
    ownership.insert(
        "sherman".to_string(),
        OwnershipRecord {
            owned: true,
            copies: 2,
        },
    );
    ownership.insert(
        "tiger".to_string(),
        OwnershipRecord {
            owned: false,
            copies: 0,
        },
    );
    // Copies on hand count as owned even when the flag is unset.
    ownership.insert(
        "grenadier".to_string(),
        OwnershipRecord {
            owned: false,
            copies: 3,
        },
    );
    let out = filter_units(&catalog, &filters, Some(&ownership), &FactionTable::default());
    assert_eq!(ids(&out), vec!["sherman", "grenadier"]);
}

#[test]
fn nation_options_start_with_all_and_cycle() {
    let catalog = catalog();
    let options = nation_options(&catalog);
    assert_eq!(options[0], ALL);
    assert_eq!(options[1], "Germany");
    assert_eq!(options.len(), 6);
    assert_eq!(cycle_option(&options, "Atlantis"), ALL);
}
