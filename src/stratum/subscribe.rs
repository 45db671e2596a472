use super::*;

#[derive(Debug, PartialEq)]
pub struct Subscribe {
    pub user_agent: String,
    pub extranonce1: Option<Extranonce>,
}

impl Serialize for Subscribe {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let len = if self.extranonce1.is_some() { 2 } else { 1 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.user_agent)?;
        if let Some(extranonce1) = &self.extranonce1 {
            seq.serialize_element(extranonce1)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Subscribe {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One((String,)),
            Two((String, Option<String>)),
            Other(Vec<Value>),
        }

        match Raw::deserialize(deserializer)? {
            Raw::One((user_agent,)) => Ok(Subscribe {
                user_agent,
                extranonce1: None,
            }),
            Raw::Two((user_agent, extranonce1)) => Ok(Subscribe {
                user_agent,
                extranonce1: extranonce1.and_then(|s| s.parse().ok()),
            }),
            Raw::Other(params) if params.is_empty() => Ok(Subscribe {
                user_agent: String::new(),
                extranonce1: None,
            }),
            Raw::Other(_) => Err(de::Error::custom("unexpected subscribe params")),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct SubscribeResult {
    pub subscriptions: Vec<(String, String)>,
    pub extranonce1: Extranonce,
    pub extranonce2_size: usize,
}

impl Serialize for SubscribeResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(3))?;
        seq.serialize_element(&self.subscriptions)?;
        seq.serialize_element(&self.extranonce1)?;
        seq.serialize_element(&self.extranonce2_size)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for SubscribeResult {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (subscriptions, extranonce1, extranonce2_size) =
            <(Vec<(String, String)>, Extranonce, usize)>::deserialize(deserializer)?;

        Ok(SubscribeResult {
            subscriptions,
            extranonce1,
            extranonce2_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use {super::*, serde::de::DeserializeOwned};

    #[track_caller]
    fn case<T>(json: &str, expected: T)
    where
        T: DeserializeOwned + Serialize + PartialEq + std::fmt::Debug,
    {
        let parsed: T = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, expected, "deserialize equality");

        let ser = serde_json::to_string(&parsed).unwrap();
        let lhs: Value = serde_json::from_str(json).unwrap();
        let rhs: Value = serde_json::from_str(&ser).unwrap();
        assert_eq!(lhs, rhs, "semantic JSON equality");

        let back: T = serde_json::from_str(&ser).unwrap();
        assert_eq!(back, expected, "roundtrip equality");
    }

    #[test]
    fn subscribe_only_user_agent() {
        case::<Subscribe>(
            r#"["krill/0.1.0"]"#,
            Subscribe {
                user_agent: "krill/0.1.0".into(),
                extranonce1: None,
            },
        );
    }

    #[test]
    fn subscribe_with_prior_extranonce1() {
        case::<Subscribe>(
            r#"["krill/0.1.0","abcd"]"#,
            Subscribe {
                user_agent: "krill/0.1.0".into(),
                extranonce1: Some("abcd".parse().unwrap()),
            },
        );
    }

    #[test]
    fn subscribe_result() {
        case::<SubscribeResult>(
            r#"[[["mining.set_difficulty","b4b6693b72a50c7116db18d6497cac52"],["mining.notify","ae6812eb4cd7735a302a8a9dd95cf71f"]],"08000002",4]"#,
            SubscribeResult {
                subscriptions: vec![
                    (
                        "mining.set_difficulty".into(),
                        "b4b6693b72a50c7116db18d6497cac52".into(),
                    ),
                    (
                        "mining.notify".into(),
                        "ae6812eb4cd7735a302a8a9dd95cf71f".into(),
                    ),
                ],
                extranonce1: "08000002".parse().unwrap(),
                extranonce2_size: 4,
            },
        );
    }
}
