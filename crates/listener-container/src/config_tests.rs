//! Tests for container configuration.

use super::*;
use crate::test_support::RecordingProvider;

fn queue(name: &str) -> QueueName {
    QueueName::new(name.to_string()).unwrap()
}

fn noop_listener() -> MessageListener {
    MessageListener::from_fn(|_, _| async { Ok(()) })
}

fn valid_config() -> ContainerConfig {
    ContainerConfig::new()
        .with_queue(queue("orders"))
        .with_message_listener(noop_listener())
}

#[test]
fn test_defaults() {
    let config = ContainerConfig::default();

    assert!(config.queue_names().is_empty());
    assert!(config.message_listener().is_none());
    assert!(config.is_expose_listener_channel());
    assert_eq!(config.acknowledge_mode(), AcknowledgeMode::Auto);
    assert!(config.error_handler().is_none());
    assert!(config.is_auto_startup());
    assert_eq!(config.phase(), i32::MAX);
    assert!(!config.is_channel_transacted());
    assert!(config.is_default_requeue_rejected());
}

#[test]
fn test_valid_config_passes() {
    assert!(valid_config().validate().is_ok());
}

#[test]
fn test_empty_queue_set_rejected() {
    let config = ContainerConfig::new().with_message_listener(noop_listener());

    assert!(matches!(
        config.validate(),
        Err(ConfigurationError::Missing { ref key }) if key == "queue_names"
    ));
}

#[test]
fn test_missing_listener_rejected() {
    let config = ContainerConfig::new().with_queue(queue("orders"));

    assert!(matches!(
        config.validate(),
        Err(ConfigurationError::Missing { ref key }) if key == "message_listener"
    ));
}

#[test]
fn test_acknowledge_conflicts_rejected() {
    let none_transacted = valid_config()
        .with_acknowledge_mode(AcknowledgeMode::None)
        .with_channel_transacted(true);
    assert!(matches!(
        none_transacted.validate(),
        Err(ConfigurationError::Conflict { .. })
    ));

    let manual_hidden = valid_config()
        .with_acknowledge_mode(AcknowledgeMode::Manual)
        .with_expose_listener_channel(false)
        .with_channel_provider(Arc::new(RecordingProvider::new()));
    assert!(matches!(
        manual_hidden.validate(),
        Err(ConfigurationError::Conflict { .. })
    ));
}

#[test]
fn test_hidden_channel_requires_provider() {
    let config = valid_config().with_expose_listener_channel(false);
    assert!(matches!(
        config.validate(),
        Err(ConfigurationError::Missing { ref key }) if key == "channel_provider"
    ));

    let config = config.with_channel_provider(Arc::new(RecordingProvider::new()));
    assert!(config.validate().is_ok());
}

#[test]
fn test_queue_set_operations() {
    let mut config = ContainerConfig::new();
    config.add_queue_names([queue("orders"), queue("invoices"), queue("orders")]);
    assert_eq!(config.queue_names(), &[queue("orders"), queue("invoices")]);

    assert!(config.remove_queue_names(&[queue("orders")]));
    assert!(!config.remove_queue_names(&[queue("unknown")]));
    assert_eq!(config.queue_names(), &[queue("invoices")]);

    config.set_queue_names([queue("audit")]);
    assert_eq!(config.queue_names(), &[queue("audit")]);
}

#[test]
fn test_debug_hides_collaborators() {
    let config = valid_config().with_listener_id("orders-listener".to_string());
    let debug = format!("{config:?}");

    assert!(debug.contains("orders-listener"));
    assert!(debug.contains("function"));
}
