//! Service-level caching: containers and persistence managers are built once

use super::support::{demo_metadata, service, CountingMetadata, DemoService, ScriptedClient};
use entity_proxy::config::ServiceConfig;
use entity_proxy::{ContainerInterface, MetadataResolver, ProxyError, Service};
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_entity_container_is_cached() {
    let (service, _client) = service(true);

    let first = service.container::<DemoService>().unwrap();
    let second = service
        .entity_container(&ContainerInterface::new("Demo.DemoService"))
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(service.container_count(), 1);
}

#[test]
fn test_concurrent_container_requests_construct_once() {
    let metadata = Arc::new(CountingMetadata::new(demo_metadata()));
    let resolver: Arc<dyn MetadataResolver> = Arc::clone(&metadata) as Arc<dyn MetadataResolver>;
    let service = Arc::new(Service::new(Arc::new(ScriptedClient::new()), resolver, true));
    let barrier = Arc::new(Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                service.container::<DemoService>().unwrap()
            })
        })
        .collect();
    let containers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(containers.iter().all(|c| Arc::ptr_eq(c, &containers[0])));
    assert_eq!(metadata.lookups(), 1);
    assert_eq!(service.container_count(), 1);
}

#[test]
fn test_unknown_interface_is_rejected() {
    let (service, _client) = service(true);

    let err = service
        .entity_container(&ContainerInterface::new("Demo.NotAContainer"))
        .unwrap_err();

    assert!(matches!(&err, ProxyError::InvalidContainerShape(name) if name == "Demo.NotAContainer"));
    assert!(!err.is_retriable());
    assert_eq!(service.container_count(), 0);
}

#[test]
fn test_persistence_manager_is_built_once_and_matches_mode() {
    for transactional in [true, false] {
        let (service, _client) = service(transactional);
        let service = Arc::new(service);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                thread::spawn(move || service.persistence_manager())
            })
            .collect();
        let managers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(managers.iter().all(|m| Arc::ptr_eq(m, &managers[0])));
        assert_eq!(managers[0].is_transactional(), transactional);
        assert_eq!(service.is_transactional(), transactional);
    }
}

#[test]
fn test_context_is_never_replaced() {
    let (service, _client) = service(false);
    let context = Arc::clone(service.context());

    service.container::<DemoService>().unwrap();
    service.persistence_manager();

    assert!(Arc::ptr_eq(&context, service.context()));
}

#[test]
fn test_metadata_pass_throughs() {
    let (service, _client) = service(true);

    assert_eq!(service.complex_type("Demo.Address").unwrap().properties.len(), 2);
    assert_eq!(service.enum_type("Demo.Color").unwrap().members[1].0, "Green");
    assert_eq!(service.term("Core.Description").unwrap().type_name, "Edm.String");

    let err = service.enum_type("Demo.Shade").unwrap_err();
    assert!(matches!(err, ProxyError::UnknownTypeName(name) if name == "Demo.Shade"));
    assert!(matches!(
        service.complex_type("Demo.Missing"),
        Err(ProxyError::UnknownTypeName(_))
    ));
    assert!(matches!(
        service.term("Core.Missing"),
        Err(ProxyError::UnknownTypeName(_))
    ));
}

#[test]
fn test_from_config_selects_strategy() {
    let config = ServiceConfig {
        service_root: Some("http://localhost:8080/svc".to_string()),
        transactional: false,
        ..ServiceConfig::default()
    };
    let service = Service::from_config(
        &config,
        Arc::new(ScriptedClient::new()),
        Arc::new(demo_metadata()),
    );

    assert!(!service.is_transactional());
    assert!(!service.persistence_manager().is_transactional());
    assert_eq!(service.service_root(), Some("http://localhost:8080/svc"));
}
