#[cfg(test)]
pub mod test {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Serialize};

    use crate::tag::{FieldOptions, FlagSchema};
    use crate::types::Secret;

    #[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
    #[serde(rename_all = "lowercase")]
    pub enum Mode {
        Fast,
        Safe,
    }

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
    #[serde(default)]
    pub struct Tls {
        pub cert: String,
        pub key: String,
    }

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    #[serde(default)]
    pub struct Db {
        pub pool_size: usize,
    }

    impl Default for Db {
        fn default() -> Self {
            Self { pool_size: 5 }
        }
    }

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    #[serde(default)]
    pub struct ServerArgs {
        pub host: String,
        pub port: u16,
        pub verbose: bool,
        pub mode: Mode,
        pub tls: Option<Tls>,
        pub password: Secret<String>,
        pub db: Db,
        pub labels: BTreeMap<String, String>,
        pub peers: Vec<String>,
    }

    impl Default for ServerArgs {
        fn default() -> Self {
            Self {
                host: "127.0.0.1".into(),
                port: 8080,
                verbose: false,
                mode: Mode::Safe,
                tls: None,
                password: Secret::default(),
                db: Db::default(),
                labels: BTreeMap::new(),
                peers: Vec::new(),
            }
        }
    }

    impl FlagSchema for ServerArgs {
        fn tag(path: &str) -> Option<&'static str> {
            match path {
                "port" => Some("short=p,persistent"),
                "verbose" => Some("short=v,noopt=true"),
                "tls.cert" => Some("default=/etc/tls/cert.pem"),
                _ => None,
            }
        }

        fn options(path: &str) -> Option<FieldOptions> {
            match path {
                "host" => Some(
                    FieldOptions::new()
                        .help("Address to bind")
                        .help_in("de", "Adresse zum Binden"),
                ),
                _ => None,
            }
        }
    }

    #[test]
    fn server_args_defaults() {
        let args = ServerArgs::default();
        assert_eq!(args.host, "127.0.0.1");
        assert_eq!(args.port, 8080);
        assert_eq!(args.mode, Mode::Safe);
        assert!(args.tls.is_none());
        assert_eq!(args.db.pool_size, 5);
    }
}
