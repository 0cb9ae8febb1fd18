use lookupdao_core::entity::{from_value, Attribute, Entity, SqlType};

/// Entity with one attribute of every storable type
#[derive(Clone, Default, Debug, PartialEq)]
pub struct Sample {
    pub id: i64,
    pub key: String,
    pub count: i64,
    pub ratio: Option<f64>,
    pub flag: bool,
}

impl Entity for Sample {
    const NAME: &'static str = "Sample";
    const TABLE: &'static str = "samples";

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
                .with_column("sample_key")
                .with_accessors(|e| e.key.clone().into(), |e, v| {
                    e.key = from_value(v)?;
                    Ok(())
                }),
            Attribute::<Self>::new("count", SqlType::Integer).with_accessors(
                |e| e.count.into(),
                |e, v| {
                    e.count = from_value(v)?;
                    Ok(())
                },
            ),
            Attribute::<Self>::new("ratio", SqlType::Real)
                .nullable()
                .with_accessors(|e| e.ratio.into(), |e, v| {
                    e.ratio = from_value(v)?;
                    Ok(())
                }),
            Attribute::<Self>::new("flag", SqlType::Boolean).with_accessors(
                |e| e.flag.into(),
                |e, v| {
                    e.flag = from_value(v)?;
                    Ok(())
                },
            ),
        ]
    }
}

/// Attribute names a generated restriction may reference
#[allow(dead_code)]
pub const SAMPLE_ATTRIBUTES: [&str; 5] = ["id", "key", "count", "ratio", "flag"];
