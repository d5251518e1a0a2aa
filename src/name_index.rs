use std::collections::HashMap;

use crate::entity::{EntitySet, Named};

/// Name → id lookup shared by every relation extractor.
///
/// Names are assumed unique across types but this is not checked: when two
/// entities share a name the one inserted last wins.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    by_name: HashMap<String, String>,
}

impl NameIndex {
    /// Insert every record with a non-empty name and id.
    pub fn extend<T: Named>(&mut self, items: &[T]) {
        for item in items {
            if item.name().is_empty() || item.id().is_empty() {
                continue;
            }
            self.by_name
                .insert(item.name().to_string(), item.id().to_string());
        }
    }

    /// Index characters, materials, weapons and monsters, in that order.
    /// On a shared name the later type wins, so a monster shadows a
    /// character. Artifacts and the curated catalogues are never indexed.
    pub fn from_entities(entities: &EntitySet) -> Self {
        let mut index = Self::default();
        index.extend(&entities.characters);
        index.extend(&entities.materials);
        index.extend(&entities.weapons);
        index.extend(&entities.monsters);
        index
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{CatalogEntity, Character, Material, Monster};

    fn character(id: &str, name: &str) -> Character {
        Character {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_names_are_not_indexed() {
        let mut index = NameIndex::default();
        index.extend(&[character("character1", ""), character("character2", "胡桃")]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.resolve("胡桃"), Some("character2"));
        assert!(index.resolve("").is_none());
    }

    #[test]
    fn test_name_collision_last_insert_wins() {
        let entities = EntitySet {
            characters: vec![character("character1", "若陀")],
            materials: vec![Material {
                id: "material9".into(),
                name: "若陀".into(),
                ..Default::default()
            }],
            monsters: vec![Monster {
                id: "monster1".into(),
                name: "若陀".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let index = NameIndex::from_entities(&entities);
        assert_eq!(index.resolve("若陀"), Some("monster1"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_catalogues_are_not_indexed() {
        let entities = EntitySet {
            characters: vec![character("character1", "钟离")],
            countries: vec![CatalogEntity {
                id: "country1".into(),
                name: "璃月".into(),
                ..Default::default()
            }],
            elements: vec![CatalogEntity {
                id: "element1".into(),
                name: "岩".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let index = NameIndex::from_entities(&entities);
        assert!(index.resolve("璃月").is_none());
        assert!(!index.contains("岩"));
        assert_eq!(index.resolve("钟离"), Some("character1"));
    }
}
