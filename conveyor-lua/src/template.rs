//! Starter configuration written by `conveyor init`

/// A commented `conveyor.lua` covering every section
pub const STARTER_CONFIG: &str = r#"-- Conveyor deployment configuration
--
-- Evaluated in a sandbox: only the table, string and math libraries are
-- available. The file must return a table.

return conveyor.define {
    -- Image name without registry or tag
    image = "shop/web",

    -- "docker" or "podman"
    engine = "docker",

    -- Build context
    source_dir = ".",

    registry = {
        url = "https://registry.example.com",
        -- Credential reference; REGISTRY_CREDS_USR / REGISTRY_CREDS_PSW are read
        -- from the environment at push time
        credential = "REGISTRY_CREDS",
    },

    app = {
        port = 3000,
        health_path = "/",
        replicas = 1,
    },

    test = {
        command = { "npm", "test" },
    },

    scan = {
        enabled = true,
        -- true reports findings without failing the run
        advisory = false,
        severity = "HIGH,CRITICAL",
    },

    verify = {
        -- Wait before each of the three liveness probes
        delay_seconds = 10,
        probe_timeout_seconds = 5,
    },

    -- One of:
    --   conveyor.container { network = "web" }
    --   conveyor.kubernetes { deployment = "web", rollout_timeout_seconds = 300 }
    --   conveyor.swarm { service = "web" }
    --   conveyor.ecs { cluster = "shop", service = "web", container = "web" }
    strategy = conveyor.container {},

    cleanup = {
        prune = false,
    },
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::parse_config;

    #[test]
    fn test_starter_config_is_valid() {
        let config = parse_config(STARTER_CONFIG).unwrap();
        assert_eq!(config.image, "shop/web");
        assert_eq!(config.strategy.name(), "container");
    }
}
