use barton_storage::{FileToRead, Storage};
use proptest::prelude::*;
use tempfile::TempDir;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn roundtrip_arbitrary_values(
        namespace in "[a-z][a-z0-9_]{0,15}",
        key in "[a-z0-9_]{1,24}(\\.json|\\.xml)?",
        value in ".{0,512}",
    ) {
        let temp = TempDir::new().unwrap();
        let storage = Storage::builder().root(temp.path()).open().unwrap();

        storage.save(&namespace, &key, &value).unwrap();

        prop_assert_eq!(storage.load(&namespace, &key).unwrap(), value);
        prop_assert_eq!(storage.has_key(&namespace, &key).unwrap(), FileToRead::Original);
        prop_assert!(storage.get_keys(&namespace).unwrap().contains(&key) || key == "store");
    }

    #[test]
    fn every_save_keeps_its_predecessor_as_backup(
        values in proptest::collection::vec(".{0,64}", 2..6),
    ) {
        let temp = TempDir::new().unwrap();
        let storage = Storage::builder().root(temp.path()).open().unwrap();
        let paths = storage.file_paths("devices", "subject").unwrap();

        for pair in values.windows(2) {
            storage.save("devices", "subject", &pair[0]).unwrap();
            storage.save("devices", "subject", &pair[1]).unwrap();

            prop_assert_eq!(&std::fs::read_to_string(&paths.main).unwrap(), &pair[1]);
            prop_assert_eq!(&std::fs::read_to_string(&paths.backup).unwrap(), &pair[0]);
        }
    }
}
