use aopipe_core::align::RegistrationStrategy;
use aopipe_core::error::AoError;
use aopipe_core::io::{parse_filenums, ObsLog, ObservationMethod};

const LOG: &str = "\
Object,ExpTime,Filter,Comments,Method,Filenums
dark,1.5,Ks,,,\"[1, 2, 3]\"
flat,1.5,Ks,,,4-8
Flat,1.5,J,,,9:12
setup,1.5,Ks,focus,,13
HIP 1234,1.5,Ks,sky,,\"range(14, 16)\"
HIP 1234,1.5,Ks,,saturated,\"range(16, 20)\"
KOI 99,10,J,,wide,20-23
KOI 99,10,J,Sky,,24.0
";

#[test]
fn test_rows_are_classified() {
    let log = ObsLog::from_reader(LOG.as_bytes()).unwrap();
    assert_eq!(log.entries.len(), 8);
    assert_eq!(log.darks().count(), 1);
    assert_eq!(log.flats().count(), 2);
    assert_eq!(log.skies().count(), 2);

    let science: Vec<&str> = log.science().map(|e| e.object.as_str()).collect();
    assert_eq!(science, vec!["HIP 1234", "KOI 99"]);
}

#[test]
fn test_entry_fields() {
    let log = ObsLog::from_reader(LOG.as_bytes()).unwrap();
    let dark = log.darks().next().unwrap();
    assert_eq!(dark.filenums, vec![1, 2, 3]);
    assert_eq!(dark.exp_time, 1.5);
    assert_eq!(dark.method, ObservationMethod::Saturated);

    let wide = log.science().find(|e| e.object == "KOI 99").unwrap();
    assert_eq!(wide.filenums, vec![20, 21, 22, 23]);
    assert_eq!(wide.method, ObservationMethod::Wide);
    assert_eq!(wide.filter, "J");

    let sky = log.sky_for("KOI 99", "J").unwrap();
    assert_eq!(sky.filenums, vec![24]);
    assert!(log.sky_for("KOI 99", "Ks").is_none());
}

#[test]
fn test_bad_filenums_name_the_row() {
    let text = "Object,ExpTime,Filter,Comments,Method,Filenums\nHD 1,1,J,,,oops\n";
    match ObsLog::from_reader(text.as_bytes()) {
        Err(AoError::ObsLog(msg)) => assert!(msg.contains("row 1"), "{msg}"),
        other => panic!("expected ObsLog error, got {other:?}"),
    }
}

#[test]
fn test_unknown_method_is_rejected() {
    let text = "Object,ExpTime,Filter,Comments,Method,Filenums\nHD 1,1,J,,speckle,1\n";
    assert!(matches!(ObsLog::from_reader(text.as_bytes()), Err(AoError::ObsLog(_))));
}

#[test]
fn test_missing_log_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        ObsLog::read(&dir.path().join("log.csv")),
        Err(AoError::FileNotFound(_))
    ));
}

#[test]
fn test_filenum_forms() {
    assert_eq!(parse_filenums("list(range(3, 6))").unwrap(), vec![3, 4, 5]);
    assert_eq!(parse_filenums("range(0, 10, 4)").unwrap(), vec![0, 4, 8]);
    assert_eq!(parse_filenums("[7.0, 8.0]").unwrap(), vec![7, 8]);
    assert_eq!(parse_filenums(" 12 ").unwrap(), vec![12]);
    assert!(parse_filenums("range(5, 5)").is_err());
    assert!(parse_filenums("range(1, 9, 0)").is_err());
    assert!(parse_filenums("1, two").is_err());
}

#[test]
fn test_method_names() {
    let cases = [
        ("default", ObservationMethod::Default, RegistrationStrategy::Bruteforce),
        ("", ObservationMethod::Saturated, RegistrationStrategy::Saturated),
        ("Wide", ObservationMethod::Wide, RegistrationStrategy::Bruteforce),
        ("saturated_wide", ObservationMethod::SaturatedWide, RegistrationStrategy::Saturated),
        ("psf-fit", ObservationMethod::PsfFit, RegistrationStrategy::PsfFit),
    ];
    for (text, method, strategy) in cases {
        let parsed = ObservationMethod::parse(text).unwrap();
        assert_eq!(parsed, method, "{text}");
        assert_eq!(parsed.strategy(), strategy, "{text}");
    }
}
