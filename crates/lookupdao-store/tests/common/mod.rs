#![allow(dead_code)]

use chrono::{Datelike, Utc};
use lookupdao_core::entity::{from_value, Attribute, Entity, SqlType};
use lookupdao_core::DbConfig;
use lookupdao_store::DataStore;
use tempfile::TempDir;

/// Entity keyed by a non-unique external id
#[derive(Clone, Default, Debug, PartialEq)]
pub struct TestEntity {
    pub id: i64,
    pub external_id: String,
    pub text: String,
    pub amount: Option<f64>,
    pub partition_id: i64,
}

impl TestEntity {
    pub fn new(external_id: &str, text: &str) -> Self {
        Self {
            external_id: external_id.to_string(),
            text: text.to_string(),
            ..Self::default()
        }
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }
}

impl Entity for TestEntity {
    const NAME: &'static str = "TestEntity";
    const TABLE: &'static str = "test_entity";

    fn attributes() -> Vec<Attribute<Self>> {
        vec![
            Attribute::<Self>::new("id", SqlType::Integer)
                .identifier()
                .with_accessors(|e| e.id.into(), |e, v| {
                    e.id = from_value(v)?;
                    Ok(())
                }),
            Attribute::<Self>::new("externalId", SqlType::Text)
                .lookup_key()
                .with_column("ext_id")
                .with_accessors(|e| e.external_id.clone().into(), |e, v| {
                    e.external_id = from_value(v)?;
                    Ok(())
                }),
            Attribute::<Self>::new("text", SqlType::Text).with_accessors(
                |e| e.text.clone().into(),
                |e, v| {
                    e.text = from_value(v)?;
                    Ok(())
                },
            ),
            Attribute::<Self>::new("amount", SqlType::Real)
                .nullable()
                .with_accessors(|e| e.amount.into(), |e, v| {
                    e.amount = from_value(v)?;
                    Ok(())
                }),
            Attribute::<Self>::new("partitionId", SqlType::Integer)
                .with_column("partition_id")
                .with_accessors(|e| e.partition_id.into(), |e, v| {
                    e.partition_id = from_value(v)?;
                    Ok(())
                }),
        ]
    }

    fn pre_persist(&mut self) {
        if self.partition_id == 0 {
            self.partition_id = i64::from(Utc::now().year());
        }
    }
}

/// Entity whose lookup key is unique
#[derive(Clone, Default, Debug, PartialEq)]
pub struct RelationalEntity {
    pub id: i64,
    pub key: String,
    pub value: String,
}

impl RelationalEntity {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            id: 0,
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

impl Entity for RelationalEntity {
    const NAME: &'static str = "RelationalEntity";
    const TABLE: &'static str = "relations";

    fn attributes() -> Vec<Attribute<Self>> {
        vec![
            Attribute::<Self>::new("id", SqlType::Integer)
                .identifier()
                .with_accessors(|e| e.id.into(), |e, v| {
                    e.id = from_value(v)?;
                    Ok(())
                }),
            Attribute::<Self>::new("key", SqlType::Text)
                .lookup_key()
                .unique()
                .with_accessors(|e| e.key.clone().into(), |e, v| {
                    e.key = from_value(v)?;
                    Ok(())
                }),
            Attribute::<Self>::new("value", SqlType::Text).with_accessors(
                |e| e.value.clone().into(),
                |e, v| {
                    e.value = from_value(v)?;
                    Ok(())
                },
            ),
        ]
    }
}

/// Parent of the locked workflow tests
#[derive(Clone, Default, Debug, PartialEq)]
pub struct SomeLookupObject {
    pub id: i64,
    pub my_id: String,
    pub name: Option<String>,
}

impl Entity for SomeLookupObject {
    const NAME: &'static str = "SomeLookupObject";
    const TABLE: &'static str = "some_lookup_object";

    fn attributes() -> Vec<Attribute<Self>> {
        vec![
            Attribute::<Self>::new("id", SqlType::Integer)
                .identifier()
                .with_accessors(|e| e.id.into(), |e, v| {
                    e.id = from_value(v)?;
                    Ok(())
                }),
            Attribute::<Self>::new("myId", SqlType::Text)
                .lookup_key()
                .unique()
                .with_column("my_id")
                .with_accessors(|e| e.my_id.clone().into(), |e, v| {
                    e.my_id = from_value(v)?;
                    Ok(())
                }),
            Attribute::<Self>::new("name", SqlType::Text)
                .nullable()
                .with_accessors(|e| e.name.clone().into(), |e, v| {
                    e.name = from_value(v)?;
                    Ok(())
                }),
        ]
    }
}

/// Child written from inside locked workflows; keyed by its parent's `my_id`
#[derive(Clone, Default, Debug, PartialEq)]
pub struct SomeRelatedLookupObject {
    pub id: i64,
    pub parent_id: String,
    pub value: String,
}

impl SomeRelatedLookupObject {
    pub fn for_parent(parent: &SomeLookupObject, value: &str) -> Self {
        Self {
            id: 0,
            parent_id: parent.my_id.clone(),
            value: value.to_string(),
        }
    }
}

impl Entity for SomeRelatedLookupObject {
    const NAME: &'static str = "SomeRelatedLookupObject";
    const TABLE: &'static str = "some_related_lookup_object";

    fn attributes() -> Vec<Attribute<Self>> {
        vec![
            Attribute::<Self>::new("id", SqlType::Integer)
                .identifier()
                .with_accessors(|e| e.id.into(), |e, v| {
                    e.id = from_value(v)?;
                    Ok(())
                }),
            Attribute::<Self>::new("parentId", SqlType::Text)
                .lookup_key()
                .with_column("parent_id")
                .with_accessors(|e| e.parent_id.clone().into(), |e, v| {
                    e.parent_id = from_value(v)?;
                    Ok(())
                }),
            Attribute::<Self>::new("value", SqlType::Text).with_accessors(
                |e| e.value.clone().into(),
                |e, v| {
                    e.value = from_value(v)?;
                    Ok(())
                },
            ),
        ]
    }
}

pub fn test_config(dir: &TempDir) -> DbConfig {
    DbConfig {
        create_schema: true,
        min_pool_size: 1,
        max_pool_size: 4,
        connection_timeout_ms: 5_000,
        lock_wait_timeout_ms: 2_000,
        ..DbConfig::sqlite(dir.path().join("lookupdao.db"))
    }
}

/// Store in create-drop mode with every test entity registered
pub fn open_store(dir: &TempDir) -> DataStore {
    DataStore::builder(test_config(dir))
        .entity::<TestEntity>()
        .entity::<RelationalEntity>()
        .entity::<SomeLookupObject>()
        .entity::<SomeRelatedLookupObject>()
        .build()
        .unwrap()
}

pub fn saved_parent(store: &DataStore, my_id: &str, name: Option<&str>) -> SomeLookupObject {
    store
        .lookup_dao::<SomeLookupObject>()
        .unwrap()
        .save(SomeLookupObject {
            id: 0,
            my_id: my_id.to_string(),
            name: name.map(str::to_string),
        })
        .unwrap()
}
