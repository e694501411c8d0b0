pub const TOPIC_CONFIG: &str = "/house/agents/TempSwitch/config";
pub const TOPIC_HEARTBEAT: &str = "/house/agents/TempSwitch/heartbeat";
pub const TOPIC_SUBSCRIPTIONS: &str = "/house/agents/TempSwitch/subscriptions";
