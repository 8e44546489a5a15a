//! Integration tests for the scene contracts
//!
//! Every scenario runs against both backends through trait objects only, the
//! way a generic consumer sees them.

use scene::markup::schema::MarkupType;
use scene::native::types::NativeType;
use scene::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

/// A backend together with the names its schema uses
struct Backend {
    scene: SceneRef,
    /// Components of a plain renderable entity
    box_components: &'static [&'static str],
    /// Component type holding the entity's "name" attribute
    name_component: &'static str,
    /// Component type accepting runtime attributes
    dynamic: &'static str,
    real_type: u32,
    type_ids: Vec<u32>,
}

fn backends() -> Vec<Backend> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    vec![
        Backend {
            scene: Rc::new(NativeScene::new()),
            box_components: &["Mesh", "Name"],
            name_component: "Name",
            dynamic: "DynamicComponent",
            real_type: NativeType::Real.id(),
            type_ids: NativeType::ALL.iter().map(|t| t.id()).collect(),
        },
        Backend {
            scene: Rc::new(MarkupScene::new()),
            box_components: &["mesh"],
            name_component: "group",
            dynamic: "data",
            real_type: MarkupType::Number.id(),
            type_ids: MarkupType::ALL.iter().map(|t| t.id()).collect(),
        },
    ]
}

/// Collects the kinds and attribute names of delivered events
fn recorder() -> (Rc<RefCell<Vec<(EventKind, Option<String>)>>>, impl Fn() -> EventHandler) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    let make = move || -> EventHandler {
        let sink = sink.clone();
        Box::new(move |event: &SceneEvent| {
            sink.borrow_mut().push((event.kind(), event.attribute_name()));
        })
    };
    (log, make)
}

#[test]
fn test_name_change_fires_once() {
    for backend in backends() {
        let scene = &backend.scene;
        let (log, handler) = recorder();
        scene.on_attribute_changed(handler()).unwrap();

        let entity = scene
            .create_entity(backend.box_components, Locality::Replicated, None)
            .unwrap();
        let name = entity
            .component(backend.name_component, None)
            .and_then(|component| component.attribute("name"))
            .unwrap();
        assert!(name.set(AttributeValue::String("Box1".into())));

        assert_eq!(
            *log.borrow(),
            vec![(EventKind::AttributeChanged, Some("name".to_string()))],
            "backend {}",
            scene.backend_name()
        );
        assert_eq!(scene.entity_by_id(entity.id()).unwrap().name(), "Box1");

        // Writing the same value again is accepted without an event
        assert!(name.set(AttributeValue::String("Box1".into())));
        assert_eq!(log.borrow().len(), 1);
    }
}

#[test]
fn test_entity_creation_announces_components() {
    for backend in backends() {
        let scene = &backend.scene;
        let (log, handler) = recorder();
        scene.on_entity_created(handler()).unwrap();
        scene.on_component_created(handler()).unwrap();

        let entity = scene
            .create_entity(backend.box_components, Locality::Replicated, None)
            .unwrap();
        let kinds: Vec<_> = log.borrow().iter().map(|(kind, _)| *kind).collect();
        assert_eq!(kinds[0], EventKind::EntityCreated);
        assert_eq!(kinds.len(), 1 + backend.box_components.len());
        assert!(kinds[1..].iter().all(|k| *k == EventKind::ComponentCreated));

        // The fixed component comes first and cannot be removed
        let fixed = entity.fixed_component().unwrap();
        assert!(fixed.is_fixed());
        assert_eq!(entity.components()[0].id(), ComponentId::FIXED);
        assert!(!entity.remove_component(ComponentId::FIXED));
    }
}

#[test]
fn test_component_name_collision_is_rejected() {
    for backend in backends() {
        let entity = backend
            .scene
            .create_entity(&[], Locality::Replicated, None)
            .unwrap();
        let (log, handler) = recorder();
        entity.on_component_created(handler()).unwrap();

        let first = entity.create_component(backend.dynamic, Some("state"), false);
        assert!(first.is_some());
        assert!(entity
            .create_component(backend.dynamic, Some("state"), false)
            .is_none());
        assert!(entity
            .create_component(backend.dynamic, Some("other"), false)
            .is_some());
        assert!(entity.create_component("NoSuchType", None, false).is_none());

        assert_eq!(log.borrow().len(), 2);
        assert!(entity.has_component(backend.dynamic, Some("state")));
    }
}

#[test]
fn test_unsubscribed_handler_stops_receiving() {
    for backend in backends() {
        let scene = &backend.scene;
        let (first_log, first) = recorder();
        let (second_log, second) = recorder();
        let token = scene.on_entity_created(first()).unwrap();
        scene.on_entity_created(second()).unwrap();

        scene.create_entity(&[], Locality::Replicated, None).unwrap();
        assert!(scene.unsubscribe(&token));
        assert!(!scene.unsubscribe(&token));
        scene.create_entity(&[], Locality::Replicated, None).unwrap();

        assert_eq!(first_log.borrow().len(), 1);
        assert_eq!(second_log.borrow().len(), 2);
    }
}

#[test]
fn test_component_removal_order() {
    for backend in backends() {
        let scene = &backend.scene;
        let entity = scene
            .create_entity(backend.box_components, Locality::Replicated, None)
            .unwrap();
        let component = entity.components().pop().unwrap();

        let order = Rc::new(RefCell::new(Vec::new()));
        let sink = order.clone();
        entity
            .on_component_removed(Box::new(move |_: &SceneEvent| sink.borrow_mut().push("entity")))
            .unwrap();
        let sink = order.clone();
        let expired_at_delivery = Rc::new(RefCell::new(None));
        let seen = expired_at_delivery.clone();
        scene
            .on_component_removed(Box::new(move |event: &SceneEvent| {
                if let SceneEvent::ComponentRemoved { component, .. } = event {
                    *seen.borrow_mut() = Some(component.expired());
                }
                sink.borrow_mut().push("scene");
            }))
            .unwrap();

        assert!(entity.remove_component(component.id()));
        assert_eq!(*order.borrow(), ["entity", "scene"]);
        assert_eq!(*expired_at_delivery.borrow(), Some(false));
        assert!(component.expired());
        assert!(entity.component_by_id(component.id()).is_none());
        assert!(!entity.remove_component(component.id()));
    }
}

#[test]
fn test_removed_entity_expires_handles() {
    for backend in backends() {
        let scene = &backend.scene;
        let entity = scene.create_entity(&[], Locality::Replicated, None).unwrap();
        let child = scene
            .create_entity(&[], Locality::Replicated, Some(entity.id()))
            .unwrap();
        let component = entity
            .create_component(backend.dynamic, Some("state"), false)
            .unwrap();
        let attribute = component
            .create_attribute(backend.real_type, "speed")
            .unwrap();

        let (log, handler) = recorder();
        scene.on_entity_removed(handler()).unwrap();

        assert!(scene.remove_entity(entity.id()));
        assert_eq!(log.borrow().len(), 2);
        for handle in [&entity, &child] {
            assert!(handle.expired());
            assert!(scene.entity_by_id(handle.id()).is_none());
        }
        assert!(component.expired());
        assert!(attribute.expired());
        assert!(attribute.get().is_none());
        assert!(!attribute.set(AttributeValue::Real(1.0)));
        assert!(entity.components().is_empty());
        assert!(!scene.remove_entity(entity.id()));
    }
}

#[test]
fn test_dynamic_attribute_lifecycle() {
    for backend in backends() {
        let scene = &backend.scene;
        let entity = scene.create_entity(&[], Locality::Replicated, None).unwrap();
        let component = entity
            .create_component(backend.dynamic, None, false)
            .unwrap();
        assert!(component.is_dynamic());

        let (component_log, handler) = recorder();
        component.on_attribute_added(handler()).unwrap();
        component.on_attribute_changed(handler()).unwrap();
        component.on_attribute_about_to_be_removed(handler()).unwrap();
        let (scene_log, handler) = recorder();
        scene.on_attribute_changed(handler()).unwrap();

        let speed = component
            .create_attribute(backend.real_type, "speed")
            .unwrap();
        assert!(component.create_attribute(backend.real_type, "speed").is_none());
        assert_eq!(speed.index(), Some(0));
        assert!(speed.set(AttributeValue::Real(2.5)));
        assert_eq!(speed.get(), Some(AttributeValue::Real(2.5)));
        assert_eq!(speed.to_display_string().as_deref(), Some("2.5"));
        assert!(speed.set_from_string("4").unwrap());
        assert_eq!(speed.get(), Some(AttributeValue::Real(4.0)));
        assert!(speed.set_from_string("fast").is_err());
        assert_eq!(speed.get(), Some(AttributeValue::Real(4.0)));

        assert!(component.remove_attribute("speed"));
        assert!(speed.expired());
        assert!(!component.remove_attribute("speed"));
        assert_eq!(component.num_attributes(), 0);

        let speed = Some("speed".to_string());
        assert_eq!(
            *component_log.borrow(),
            vec![
                (EventKind::AttributeAdded, speed.clone()),
                (EventKind::AttributeChanged, speed.clone()),
                (EventKind::AttributeChanged, speed.clone()),
                (EventKind::AttributeAboutToBeRemoved, speed.clone()),
            ]
        );
        assert_eq!(scene_log.borrow().len(), 2);
    }
}

#[test]
fn test_typed_components_reject_new_attributes() {
    for backend in backends() {
        let entity = backend
            .scene
            .create_entity(backend.box_components, Locality::Replicated, None)
            .unwrap();
        let mesh = entity.component(backend.box_components[0], None).unwrap();
        let before = mesh.num_attributes();

        assert!(!mesh.is_dynamic());
        assert!(mesh.create_attribute(backend.real_type, "extra").is_none());
        assert!(!mesh.remove_attribute("extra"));
        assert_eq!(mesh.num_attributes(), before);
    }
}

#[test]
fn test_every_type_id_has_one_class() {
    for backend in backends() {
        let scene = backend.scene.as_ref();
        for type_id in &backend.type_ids {
            assert!(
                classify(scene, *type_id).is_ok(),
                "{} type {type_id} is ambiguous",
                scene.backend_name()
            );
        }
        let unknown = classify(scene, 999).unwrap_err();
        assert_eq!(unknown.matches, 0);
    }
}

#[test]
fn test_every_schema_attribute_is_classified() {
    for backend in backends() {
        let scene = &backend.scene;
        let names: Vec<String> = scene.component_types().into_iter().map(|t| t.name).collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let entity = scene
            .create_entity(&names, Locality::Replicated, None)
            .unwrap();

        for component in entity.components() {
            for attribute in component.attributes() {
                assert!(
                    classify(scene.as_ref(), attribute.type_id()).is_ok(),
                    "{}.{} has no single class",
                    component.type_name(),
                    attribute.name()
                );
                let display = attribute.to_display_string().unwrap();
                assert!(
                    attribute.set_from_string(&display).unwrap(),
                    "{}.{} did not accept its own text {display:?}",
                    component.type_name(),
                    attribute.name()
                );
            }
        }
    }
}

#[test]
fn test_reparenting_rejects_cycles() {
    for backend in backends() {
        let scene = &backend.scene;
        let root = scene.create_entity(&[], Locality::Replicated, None).unwrap();
        let child = scene
            .create_entity(&[], Locality::Replicated, Some(root.id()))
            .unwrap();

        assert_eq!(child.parent_id(), Some(root.id()));
        assert!(matches!(
            scene.set_parent(root.id(), Some(child.id())),
            Err(SceneError::HierarchyCycle { .. })
        ));
        assert!(scene.set_parent(child.id(), None).unwrap());
        assert_eq!(child.parent_id(), None);
        assert!(root.children().is_empty());
        assert_eq!(scene.all_entities().len(), 2);
    }
}

#[test]
fn test_local_entities_use_local_ids() {
    for backend in backends() {
        let scene = &backend.scene;
        let replicated = scene.create_entity(&[], Locality::Replicated, None).unwrap();
        let local = scene.create_entity(&[], Locality::Local, None).unwrap();

        assert!(!replicated.is_local());
        assert!(local.is_local());
        assert!(local.id().0 >= SceneConfig::default().local_id_base);
        assert!(replicated.id().0 < SceneConfig::default().local_id_base);
    }
}
