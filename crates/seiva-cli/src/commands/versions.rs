use seiva_adapters::AdapterRegistry;

pub fn handle() {
    let registry = AdapterRegistry::with_defaults();
    for version in registry.supported_versions() {
        println!("{version}");
    }
}
