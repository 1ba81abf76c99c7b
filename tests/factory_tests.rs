//! Integration tests for loading and reloading object graphs from disk.
//!
//! Sources live in a temp directory and are rewritten between reloads;
//! objects are built by a `TypeContainer` over a small `Component` trait.

use confgraph::container::ResolvedProperties;
use confgraph::{
    ConfError, ConfigurationFactory, ConstructionError, DryRunContainer, IndirectionHandle,
    Instance, ObjectDeclaration, ObjectKind, PropertyValue, TypeContainer,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

trait Component: Send + Sync {
    fn describe(&self) -> String;
}

confgraph::forward_capability!(Component {
    fn describe(&self) -> String;
});

struct Holder {
    key: String,
}

impl Component for Holder {
    fn describe(&self) -> String {
        self.key.clone()
    }
}

struct Widget {
    name: String,
    child: Option<Arc<dyn Component>>,
}

impl Component for Widget {
    fn describe(&self) -> String {
        match &self.child {
            Some(child) => format!("{}[{}]", self.name, child.describe()),
            None => self.name.clone(),
        }
    }
}

type Props = ResolvedProperties<dyn Component>;

fn container() -> TypeContainer<dyn Component> {
    TypeContainer::new()
        .with_type("Holder", |p: &Props| {
            let key = p.string("key").unwrap_or_default();
            Ok(Instance::Surface(Arc::new(Holder { key }) as Arc<dyn Component>))
        })
        .with_type("Widget", |p: &Props| {
            let name = p.string("name").unwrap_or_else(|| "widget".to_string());
            Ok(Instance::Surface(Arc::new(Widget {
                name,
                child: p.surface("child"),
            }) as Arc<dyn Component>))
        })
        .with_type("Gear", |_: &Props| {
            Ok(Instance::Surface(Arc::new(Holder {
                key: "gear".to_string(),
            }) as Arc<dyn Component>))
        })
}

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).expect("Failed to write source file");
}

fn factory_in(dir: &TempDir) -> ConfigurationFactory<TypeContainer<dyn Component>> {
    ConfigurationFactory::builder(container())
        .settings(
            confgraph::config::FactorySettings::default()
                .with_base_name("app")
                .with_search_dirs([dir.path().to_path_buf()]),
        )
        .build()
}

fn handle(
    factory: &ConfigurationFactory<TypeContainer<dyn Component>>,
    id: &str,
) -> IndirectionHandle<dyn Component> {
    factory.get_handle(id).expect("handle should exist")
}

#[test]
fn test_defaults_then_override_retargets_handle() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "app.def.yaml",
        "app:\n  _type: Holder\n  _proxy: true\n  key: value1\n",
    );

    let mut factory = factory_in(&dir);
    factory.load_configuration().unwrap();
    let h = handle(&factory, "app");
    assert_eq!(h.describe(), "value1");

    write(dir.path(), "app.yaml", "app:\n  key: value2\n");
    factory.reload().unwrap();

    assert_eq!(h.describe(), "value2");
    assert!(h.same_handle(&handle(&factory, "app")));
}

#[test]
fn test_nested_entry_becomes_anonymous_child() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "app.yaml",
        "app:\n  _type: Widget\n  child:\n    _type: Gear\n",
    );

    let mut factory = factory_in(&dir);
    factory.load_configuration().unwrap();

    let specs = factory.specs();
    assert_eq!(specs.ids().collect::<Vec<_>>(), vec!["child-1", "app"]);
    let app = specs.get("app").unwrap();
    assert_eq!(app.kind, ObjectKind::Type("Widget".to_string()));
    assert_eq!(
        app.property("child"),
        Some(&PropertyValue::Reference("child-1".to_string()))
    );
    assert_eq!(specs.get("child-1").unwrap().type_name(), Some("Gear"));
}

#[test]
fn test_missing_type_registers_nothing() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "app.yaml",
        "first:\n  _type: Holder\n  key: ok\napp:\n  name: no type here\n",
    );

    let mut factory = ConfigurationFactory::builder(container())
        .settings(
            confgraph::config::FactorySettings::default()
                .with_base_name("app")
                .with_search_dirs([dir.path().to_path_buf()]),
        )
        .declare(ObjectDeclaration::new("app"))
        .build();

    let err = factory.load_configuration().unwrap_err();
    assert!(err.is_spec_resolution());
    assert!(matches!(err, ConfError::MissingTypeOrParent { ref id } if id == "app"));
    assert_eq!(factory.registered_ids().count(), 0);
    assert!(!factory.container().is_registered("first"));
}

#[test]
fn test_builds_are_deterministic() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "app.yaml",
        "a:\n  _type: Widget\n  child: {_type: Gear}\nb:\n  _type: Widget\n  child: {_type: Gear}\n",
    );

    let mut factory = factory_in(&dir);
    factory.load_configuration().unwrap();
    let first = factory.specs().clone();
    factory.reload().unwrap();
    assert_eq!(&first, factory.specs());
    assert_eq!(
        first.ids().collect::<Vec<_>>(),
        vec!["child-1", "a", "child-2", "b"]
    );
}

#[test]
fn test_every_reload_reaches_latest_instance() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "app.yaml",
        "app:\n  _type: Widget\n  _proxy: true\n  name: r0\n",
    );

    let mut factory = factory_in(&dir);
    factory.load_configuration().unwrap();
    let h = handle(&factory, "app");
    let clone = h.clone();

    for round in 1..=3 {
        let content = format!(
            "app:\n  _type: Widget\n  _proxy: true\n  name: r{}\n  child: {{_type: Holder, key: k{}}}\n",
            round, round
        );
        write(dir.path(), "app.yaml", &content);
        factory.reload().unwrap();
        let expected = format!("r{}[k{}]", round, round);
        assert_eq!(h.describe(), expected);
        assert_eq!(clone.describe(), expected);
    }
    assert_eq!(factory.generation(), 4);
}

#[test]
fn test_profile_layers_on_disk() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "app.def.yaml",
        "app: {_type: Holder, _proxy: true, key: default}\n",
    );
    write(dir.path(), "app-prod.def.json", r#"{"app": {"key": "prod-default"}}"#);
    write(dir.path(), "app-prod.yml", "app:\n  key: prod\n");

    let mut factory = ConfigurationFactory::builder(container())
        .settings(
            confgraph::config::FactorySettings::default()
                .with_base_name("app")
                .with_profiles(["prod"])
                .with_search_dirs([dir.path().to_path_buf()]),
        )
        .build();
    factory.load_configuration().unwrap();
    assert_eq!(handle(&factory, "app").describe(), "prod");

    fs::remove_file(dir.path().join("app-prod.yml")).unwrap();
    factory.reload().unwrap();
    assert_eq!(handle(&factory, "app").describe(), "prod-default");
}

#[test]
fn test_declared_object_gets_handle() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "app.yaml", "app:\n  key: declared\n");

    let mut factory = ConfigurationFactory::builder(container())
        .settings(
            confgraph::config::FactorySettings::default()
                .with_base_name("app")
                .with_search_dirs([dir.path().to_path_buf()]),
        )
        .declare(ObjectDeclaration::new("app").of_type("Holder").indirect())
        .build();
    factory.load_configuration().unwrap();
    assert_eq!(handle(&factory, "app").describe(), "declared");
}

#[test]
fn test_parent_inherits_type_and_properties() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "app.yaml",
        "base:\n  _type: Holder\n  key: inherited\nderived:\n  _parent: base\n  _proxy: true\n",
    );

    let mut factory = factory_in(&dir);
    factory.load_configuration().unwrap();
    assert_eq!(handle(&factory, "derived").describe(), "inherited");
}

#[test]
fn test_unknown_type_is_construction_error() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "app.yaml", "app: {_type: Sprocket}\n");

    let mut factory = factory_in(&dir);
    let err = factory.load_configuration().unwrap_err();
    assert!(matches!(
        err,
        ConfError::Construction(ConstructionError::UnknownType { ref type_name, .. })
            if type_name == "Sprocket"
    ));
    assert!(!err.is_spec_resolution());
}

#[test]
fn test_dry_run_container_reports_specs() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "app.yaml",
        "app: {_type: Anything, _proxy: true, size: 3}\n",
    );

    let mut factory = ConfigurationFactory::builder(DryRunContainer::new())
        .settings(
            confgraph::config::FactorySettings::default()
                .with_base_name("app")
                .with_search_dirs([dir.path().to_path_buf()]),
        )
        .build();
    factory.load_configuration().unwrap();

    let spec = factory.get_handle("app").unwrap().current();
    assert_eq!(spec.type_name(), Some("Anything"));
    assert_eq!(factory.container().len(), 1);
}
