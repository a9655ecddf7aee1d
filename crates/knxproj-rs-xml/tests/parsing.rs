// crates/knxproj-rs-xml/tests/parsing.rs

use knxproj_rs_xml::{
    Completeness, DatapointType, DialectKind, DiagnosticKind, DocumentSet, IndividualAddress, ParameterValue,
    ParseOptions, Placement, SpaceType, load_product, load_project,
};
use std::fs;
use std::path::PathBuf;

const APP: &str = "M-0083_A-0001-01-0000";

/// Helper function to load a test file from the `tests/data/` directory.
fn load_test_file(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("data");
    path.push(name);

    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read test file {:?}: {}", path, e))
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn project_documents() -> DocumentSet {
    DocumentSet::from_project_str(&load_test_file("0.xml"))
        .expect("Failed to parse 0.xml")
        .with_project_meta_str(&load_test_file("project.xml"))
        .with_master_str(&load_test_file("knx_master.xml"))
        .with_manufacturer_str("M-0083/Hardware.xml", &load_test_file("M-0083/Hardware.xml"))
        .with_manufacturer_str(
            "M-0083/M-0083_A-0001-01-0000.xml",
            &load_test_file("M-0083/M-0083_A-0001-01-0000.xml"),
        )
}

fn product_documents() -> DocumentSet {
    DocumentSet::new()
        .with_master_str(&load_test_file("knx_master.xml"))
        .with_manufacturer_str("M-0083/Hardware.xml", &load_test_file("M-0083/Hardware.xml"))
        .with_manufacturer_str(
            "M-0083/M-0083_A-0001-01-0000.xml",
            &load_test_file("M-0083/M-0083_A-0001-01-0000.xml"),
        )
}

fn address(s: &str) -> IndividualAddress {
    s.parse().expect("valid individual address")
}

#[test]
fn test_project_information_and_topology() {
    init_logging();
    let parsed = load_project(&project_documents(), &ParseOptions::default()).expect("Failed to load project");
    assert_eq!(parsed.gaps().count(), 0, "unexpected gaps: {:?}", parsed.diagnostics);
    let project = parsed.value;

    assert_eq!(project.info.project_id, "P-0001");
    assert_eq!(project.info.name, "Demo House");
    assert_eq!(project.info.created_by, "ETS6");
    assert_eq!(project.info.schema_version, Some(21));

    assert_eq!(project.topology.len(), 2);
    assert_eq!(project.topology[0].lines.len(), 1);
    assert!(project.topology[1].lines.is_empty());
    // The power supply has no individual address.
    assert_eq!(
        project.topology[0].lines[0].devices,
        vec![address("1.1.1"), address("1.1.2")]
    );
    assert_eq!(project.devices.len(), 2);

    let device = &project.devices[&address("1.1.1")];
    assert_eq!(device.name, "Room sensor");
    assert_eq!(device.manufacturer_id, "M-0083");
    assert_eq!(device.manufacturer_name, "MDT technologies");
    assert_eq!(device.product_name, "Room temperature controller");
    assert_eq!(device.order_number, "SCN-RT1UP.01");
    assert_eq!(device.hardware_name, "SCN-RT1UP");
    assert_eq!(device.application_program_ref.as_deref(), Some(APP));
    assert_eq!(device.completeness, Completeness::Complete);
    assert_eq!(device.channels.len(), 1);
    assert_eq!(device.channels[0].name, "Climate");
    assert_eq!(device.channels[0].communication_object_ids, vec!["1.1.1/O-1_R-1"]);
}

/// Two devices share one temperature group address: the first sends, the
/// second listens.
#[test]
fn test_communication_objects_and_group_addresses() {
    init_logging();
    let project = load_project(&project_documents(), &ParseOptions::default())
        .expect("Failed to load project")
        .value;

    let sender = &project.communication_objects["1.1.1/O-1_R-1"];
    assert!(sender.resolved);
    assert!(sender.flags.transmit);
    assert!(sender.flags.communication);
    assert_eq!(sender.text, "Actual temperature");
    assert_eq!(sender.number, 1);
    assert_eq!(sender.dpts, vec![DatapointType::new(9, Some(1))]);
    assert_eq!(sender.send_group_addresses, vec!["1/2/3"]);
    assert_eq!(sender.channel.as_deref(), Some("CH-1"));

    let listener = &project.communication_objects["1.1.2/O-1_R-1"];
    assert!(listener.flags.communication);
    assert!(!listener.flags.transmit);
    assert_eq!(listener.listen_group_addresses, vec!["1/2/3"]);
    assert_eq!(listener.group_address_links, vec!["1/2/3"]);

    // Instances without links are not part of the project.
    assert!(!project.communication_objects.contains_key("1.1.1/O-2_R-2"));

    let switch = &project.communication_objects["1.1.2/O-2_R-2"];
    assert_eq!(switch.text, "Light on/off");
    assert_eq!(switch.dpts, vec![DatapointType::new(1, None)]);

    let temperature = &project.group_addresses["1/2/3"];
    assert_eq!(temperature.identifier, "GA-1");
    assert_eq!(temperature.dpt, Some(DatapointType::new(9, Some(1))));
    assert_eq!(
        temperature.communication_object_ids,
        vec!["1.1.1/O-1_R-1", "1.1.2/O-1_R-1"]
    );
    let with_temperature_dpt = project
        .group_addresses
        .values()
        .filter(|ga| ga.dpt == Some(DatapointType::new(9, Some(1))))
        .count();
    assert_eq!(with_temperature_dpt, 1);

    // No declared type: taken from the first linked object.
    assert_eq!(project.group_addresses["1/2/4"].dpt, Some(DatapointType::new(1, None)));

    let kitchen = &project.group_ranges["1"].group_ranges["1/2"];
    assert_eq!(kitchen.name, "Kitchen");
    assert_eq!(kitchen.group_addresses, vec!["1/2/3", "1/2/4"]);

    let info = &project.datapoint_types["9.001"];
    assert_eq!(info.name, "DPT_Value_Temp");
    assert_eq!(info.size_in_bit, Some(16));
}

#[test]
fn test_locations_and_functions() {
    init_logging();
    let project = load_project(&project_documents(), &ParseOptions::default())
        .expect("Failed to load project")
        .value;

    let house = &project.locations[0];
    assert_eq!(house.space_type, SpaceType::Building);
    let kitchen = &house.spaces[0];
    assert_eq!(kitchen.space_type, SpaceType::Room);
    assert_eq!(kitchen.usage_text, "Kitchen");
    assert_eq!(kitchen.devices, vec![address("1.1.1")]);
    assert_eq!(kitchen.functions, vec!["F-1"]);

    let function = &project.functions["F-1"];
    assert_eq!(function.usage_text, "Switchable light");
    assert_eq!(function.group_addresses[0].address.as_deref(), Some("1/2/4"));
}

#[test]
fn test_translated_texts() {
    init_logging();
    let german = load_project(&project_documents(), &ParseOptions::new().language("de-DE"))
        .expect("Failed to load project")
        .value;
    assert_eq!(german.communication_objects["1.1.1/O-1_R-1"].text, "Isttemperatur");
    // No translation for this object.
    assert_eq!(german.communication_objects["1.1.2/O-2_R-2"].text, "Light on/off");

    // An unknown locale falls back to the base texts.
    let french = load_project(&project_documents(), &ParseOptions::new().language("fr-FR"))
        .expect("Failed to load project")
        .value;
    assert_eq!(french.communication_objects["1.1.1/O-1_R-1"].text, "Actual temperature");
}

#[test]
fn test_device_parameterization() {
    init_logging();
    let project = load_project(&project_documents(), &ParseOptions::new().parameterize(true))
        .expect("Failed to load project")
        .value;
    assert_eq!(project.parameterization.len(), 2);

    let memory = &project.parameterization["P-0001-0_DI-1"];
    assert_eq!(memory.device_address, address("1.1.1"));
    assert_eq!(memory.segments.len(), 1);

    let values: Vec<_> = memory.parameters.iter().map(|p| p.value.as_deref()).collect();
    // Device value, device value, ParameterRef value, Parameter value.
    assert_eq!(values, vec![Some("1"), Some("1"), Some("1"), Some("2")]);
    assert_eq!(
        memory.parameters[3].decoded_value,
        Some(ParameterValue::Enumeration {
            value: 2,
            text: "Night".to_string()
        })
    );

    // Three 1-bit switches and a 5-bit mode packed into byte 0.
    let bits: Vec<_> = memory
        .parameters
        .iter()
        .map(|p| match &p.placement {
            Placement::Memory(m) => (m.byte_offset, m.bit_offset, m.bit_width),
            other => panic!("unexpected placement {:?}", other),
        })
        .collect();
    assert_eq!(bits, vec![(0, 0, 1), (0, 1, 1), (0, 2, 1), (0, 3, 5)]);
    assert!(memory.parameters.iter().all(|p| p.status.is_resolved()));

    // The second device has no parameter values of its own.
    let defaults = &project.parameterization["P-0001-0_DI-2"];
    assert_eq!(defaults.parameters[0].value.as_deref(), Some("0"));
}

#[test]
fn test_sequential_and_parallel_are_identical() {
    init_logging();
    let documents = project_documents();
    let sequential = load_project(&documents, &ParseOptions::new().parameterize(true)).expect("sequential");
    let parallel = load_project(&documents, &ParseOptions::new().parameterize(true).parallel(true)).expect("parallel");

    assert_eq!(
        serde_json::to_string(&sequential.value).expect("serialize"),
        serde_json::to_string(&parallel.value).expect("serialize")
    );
    assert_eq!(sequential.diagnostics, parallel.diagnostics);
}

#[test]
fn test_load_product() {
    init_logging();
    let parsed = load_product(&product_documents(), &ParseOptions::new().language("de-DE"))
        .expect("Failed to load product");
    assert!(
        parsed.diagnostics.of_kind(DiagnosticKind::ResolutionGap).next().is_none(),
        "unexpected gaps: {:?}",
        parsed.diagnostics
    );
    let product = parsed.value;

    assert_eq!(product.manufacturer_id, "M-0083");
    assert_eq!(product.manufacturer_name, "MDT technologies");
    assert_eq!(product.hardware.len(), 1);
    let hardware = &product.hardware[0];
    assert_eq!(hardware.version_number, Some(1));
    assert_eq!(hardware.products[0].order_number, "SCN-RT1UP.01");
    assert_eq!(hardware.application_program_refs, vec![APP]);
    assert_eq!(hardware.medium_types, vec!["MT-0"]);

    let program = &product.application_programs[APP];
    assert_eq!(program.dialect, DialectKind::Classic);
    assert_eq!(program.mask_version, "MV-07B0");
    assert_eq!(program.parameter_types.len(), 2);
    assert_eq!(program.parameters.len(), 4);
    assert_eq!(program.com_objects.len(), 2);
    assert_eq!(program.com_objects[0].text, "Isttemperatur");
    assert_eq!(program.dynamic_com_object_refs.len(), 2);

    let general = &program.parameter_blocks[0];
    assert_eq!(general.text, "Allgemein");
    assert_eq!(general.channel.as_deref(), Some("M-0083_A-0001-01-0000_CH-1"));
    // Parameters inside `choose`/`when` belong to the enclosing block.
    assert_eq!(general.parameter_refs.len(), 3);
    assert_eq!(program.parameter_blocks[1].channel, None);
    assert_eq!(program.channels[0].parameter_blocks, vec!["M-0083_A-0001-01-0000_PB-1"]);

    // Product files carry the defaults only.
    let values: Vec<_> = program.parameters.iter().map(|p| p.value.as_deref()).collect();
    assert_eq!(values, vec![Some("0"), Some("1"), Some("1"), Some("0")]);
}
