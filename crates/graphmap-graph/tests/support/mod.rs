//! Entity types and hand-written mappers shared by the repository suites.
//!
//! `Person` has three relationship fields: `friends` (KNOWS, outgoing,
//! fetched and persisted), `employer` (WORKS_AT to a `Company`, loaded only
//! from the root) and `followers` (FOLLOWS, incoming, fetch only). After
//! load, `tags` is derived from the raw `tags` property and `employer_name`
//! from the attached `employer`.

#![allow(dead_code)]

use std::sync::Arc;

use graphmap_core::entity::{
    Direction, EntityWithRelations, RelationshipData, RelationshipDescriptor, RelationshipMode,
};
use graphmap_core::error::MappingError;
use graphmap_core::mapper::{EntityMapper, MapperRegistry, RelatedEntities};
use graphmap_core::types::{Properties, Row, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Company {
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Person {
    pub id: Option<String>,
    pub name: String,
    pub age: Option<i64>,
    pub friends: Vec<Person>,
    pub employer: Option<Company>,
    pub followers: Vec<Person>,
    /// Raw `tags` property as stored, kept for the post-load converter.
    pub raw_tags: Option<String>,
    pub tags: Vec<String>,
    /// Name of the loaded employer, derived after relationships attach.
    pub employer_name: Option<String>,
}

impl Person {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_id(id: &str, name: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            ..Self::new(name)
        }
    }

    pub fn knows(mut self, friend: Person) -> Self {
        self.friends.push(friend);
        self
    }

    pub fn works_at(mut self, company: Company) -> Self {
        self.employer = Some(company);
        self
    }

    pub fn followed_by(mut self, follower: Person) -> Self {
        self.followers.push(follower);
        self
    }

    pub fn tagged(mut self, tags: &str) -> Self {
        self.raw_tags = Some(tags.to_string());
        self
    }

    pub fn friend_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.friends.iter().map(|f| f.name.clone()).collect();
        names.sort();
        names
    }
}

impl Company {
    pub fn with_id(id: &str, name: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            name: name.to_string(),
        }
    }
}

// ── Mappers ──────────────────────────────────────────────────────

pub struct CompanyMapper;

impl EntityMapper for CompanyMapper {
    type Entity = Company;

    fn label(&self) -> &str {
        "Company"
    }

    fn map(&self, row: &Row, alias: &str) -> Result<Company, MappingError> {
        let node = row.node(alias)?;
        Ok(Company {
            id: node.get("id")?,
            name: node.get("name")?,
        })
    }

    fn to_db(&self, company: &Company) -> EntityWithRelations {
        let mut props = Properties::new();
        if let Some(id) = &company.id {
            props.insert("id".into(), Value::from(id.as_str()));
        }
        props.insert("name".into(), Value::from(company.name.as_str()));
        EntityWithRelations::new("Company", "id", props)
    }

    fn node_id(&self, company: &Company) -> Option<Value> {
        company.id.as_deref().map(Value::from)
    }
}

pub struct PersonMapper {
    relationships: Vec<RelationshipDescriptor>,
}

impl PersonMapper {
    pub fn new() -> Self {
        Self {
            relationships: vec![
                RelationshipDescriptor::new("friends", "KNOWS", Direction::Outgoing, "Person"),
                RelationshipDescriptor::new("employer", "WORKS_AT", Direction::Outgoing, "Company")
                    .max_depth(1),
                RelationshipDescriptor::new("followers", "FOLLOWS", Direction::Incoming, "Person")
                    .mode(RelationshipMode::FetchOnly),
            ],
        }
    }

    fn node(&self, person: &Person) -> EntityWithRelations {
        let mut props = Properties::new();
        if let Some(id) = &person.id {
            props.insert("id".into(), Value::from(id.as_str()));
        }
        props.insert("name".into(), Value::from(person.name.as_str()));
        props.insert("age".into(), Value::from(person.age));
        props.insert("tags".into(), Value::from(person.raw_tags.clone()));
        EntityWithRelations::new("Person", "id", props)
    }
}

impl EntityMapper for PersonMapper {
    type Entity = Person;

    fn label(&self) -> &str {
        "Person"
    }

    fn relationships(&self) -> &[RelationshipDescriptor] {
        &self.relationships
    }

    fn map(&self, row: &Row, alias: &str) -> Result<Person, MappingError> {
        let node = row.node(alias)?;
        Ok(Person {
            id: node.get("id")?,
            name: node.get("name")?,
            age: node.get("age")?,
            raw_tags: node.get("tags")?,
            ..Default::default()
        })
    }

    fn to_db(&self, person: &Person) -> EntityWithRelations {
        let mut entity = self.node(person);
        for friend in &person.friends {
            entity = entity.with_relationship(RelationshipData::cascade(
                "KNOWS",
                Direction::Outgoing,
                RelationshipMode::FetchAndPersist,
                self.to_db(friend),
            ));
        }
        if let Some(company) = &person.employer {
            entity = entity.with_relationship(RelationshipData::cascade(
                "WORKS_AT",
                Direction::Outgoing,
                RelationshipMode::FetchAndPersist,
                CompanyMapper.to_db(company),
            ));
        }
        for follower in &person.followers {
            entity = entity.with_relationship(RelationshipData::cascade(
                "FOLLOWS",
                Direction::Incoming,
                RelationshipMode::FetchOnly,
                self.to_db(follower),
            ));
        }
        entity
    }

    fn node_id(&self, person: &Person) -> Option<Value> {
        person.id.as_deref().map(Value::from)
    }

    fn set_relation(
        &self,
        person: &mut Person,
        field: &str,
        related: RelatedEntities,
    ) -> Result<(), MappingError> {
        match field {
            "friends" => person.friends = related.into_vec(field)?,
            "employer" => person.employer = related.into_single(field)?,
            "followers" => person.followers = related.into_vec(field)?,
            other => return Err(MappingError::UnknownField(other.to_string())),
        }
        Ok(())
    }

    fn apply_post_load_converters(&self, person: &mut Person) -> Result<(), MappingError> {
        person.tags = person
            .raw_tags
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        person.employer_name = person.employer.as_ref().map(|c| c.name.clone());
        Ok(())
    }
}

pub fn registry() -> Arc<MapperRegistry> {
    Arc::new(
        MapperRegistry::new()
            .with(Arc::new(PersonMapper::new()))
            .with(Arc::new(CompanyMapper)),
    )
}

pub fn props(pairs: &[(&str, Value)]) -> Properties {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub fn person_node(id: &str, name: &str) -> Properties {
    props(&[("id", Value::from(id)), ("name", Value::from(name))])
}
