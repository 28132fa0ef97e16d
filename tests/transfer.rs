mod common;

use common::{localization, state, survey_api};
use tatorsync::api::{Entity, EntityKind};
use tatorsync::resolve::{Query, Resolver, Scope};
use tatorsync::table::Table;
use tatorsync::transfer::{
    download_chips, download_frames, download_states, fetch_localizations, localization_specs,
    localization_table, state_specs, upload_localizations, upload_states, LocalizationFilter,
    StateFilter, StateTarget, BATCH_SIZE,
};
use tatorsync::TatorError;

#[test]
fn download_table_resolves_names_and_truncates_timestamps() {
    let api = survey_api()
        .with_localization(localization(100, 9, 12))
        .with_localization(localization(101, 9, 13));
    let resolver = Resolver::new(api);

    let locs = fetch_localizations(&resolver, &LocalizationFilter::new("plankton-survey"))
        .expect("fetch");
    let table = localization_table(&resolver, &locs, None).expect("table");

    assert_eq!(
        table.headers(),
        [
            "id",
            "media_id",
            "media",
            "frame",
            "frame_tiff",
            "version_id",
            "version",
            "modified_by",
            "modified_datetime",
            "x",
            "y",
            "width",
            "height",
            "Class",
            "Verified",
        ]
    );
    let row = &table.rows()[0];
    assert_eq!(row[2], "cam7_2023.mp4");
    assert_eq!(row[4], "/data/cam7/000012.tiff");
    assert_eq!(row[6], "Baseline");
    assert_eq!(row[7], "sbatch");
    assert_eq!(row[8], "2023-03-21T14:05:09Z");
    assert_eq!(row[13], "diatom");
    assert_eq!(row[14], "True");

    // Media, version and user were each fetched once for both rows.
    assert_eq!(resolver.api().calls().get, 3);
}

#[test]
fn frame_dir_adds_image_paths() {
    let api = survey_api().with_localization(localization(100, 9, 12));
    let resolver = Resolver::new(api);
    let dir = tempfile::tempdir().expect("tempdir");

    let locs = fetch_localizations(&resolver, &LocalizationFilter::new(42u64)).expect("fetch");
    let table = localization_table(&resolver, &locs, Some(dir.path())).expect("table");

    let imagepath = table.column("imagepath").expect("imagepath column");
    assert_eq!(imagepath, table.headers().len() - 1);
    assert_eq!(
        table.cell(0, imagepath),
        dir.path().join("9_12.png").to_string_lossy()
    );
}

#[test]
fn default_loctype_requires_exactly_one_type() {
    let api = survey_api().with(EntityKind::LocalizationType, Some(42), Entity::new(4, "Dot"));
    let resolver = Resolver::new(api);

    let err = fetch_localizations(&resolver, &LocalizationFilter::new(42u64))
        .expect_err("ambiguous loctype");
    let message = err.to_string();
    assert!(message.contains("{3:Box,4:Dot}"), "{message}");

    let filter = LocalizationFilter {
        loctype: Some(Query::from("Dot")),
        ..LocalizationFilter::new(42u64)
    };
    let queries_before = resolver.api().localization_queries.borrow().len();
    fetch_localizations(&resolver, &filter).expect("explicit loctype");
    let queries = resolver.api().localization_queries.borrow();
    assert_eq!(queries.len(), queries_before + 1);
    assert_eq!(queries[queries_before].type_id, Some(4));
}

#[test]
fn filters_are_passed_to_the_listing() {
    let resolver = Resolver::new(survey_api());
    let filter = LocalizationFilter {
        media: Some(Query::from("cam7_2023.mp4")),
        version: Some(Query::from("Baseline")),
        frame: Some(12),
        attributes: vec![("Class".to_string(), "diatom".to_string())],
        window: Some((0, 100)),
        ..LocalizationFilter::new("plankton-survey")
    };

    fetch_localizations(&resolver, &filter).expect("fetch");

    let queries = resolver.api().localization_queries.borrow();
    let query = &queries[0];
    assert_eq!(query.media_ids, vec![9]);
    assert_eq!(query.versions, vec![2]);
    assert_eq!(query.type_id, Some(3));
    assert_eq!(query.frame, Some(12));
    assert_eq!(query.window, Some((0, 100)));
    assert_eq!(query.attributes, filter.attributes);
}

#[test]
fn statetype_restricts_to_state_frames() {
    let api = survey_api()
        .with_state(state(500, 9, 12))
        .with_state(state(501, 9, 12))
        .with_state(state(502, 9, 40))
        .with_localization(localization(100, 9, 12))
        .with_localization(localization(101, 9, 13))
        .with_localization(localization(102, 9, 40));
    let resolver = Resolver::new(api);
    let filter = LocalizationFilter {
        statetype: Some(Query::from("Frame Check")),
        ..LocalizationFilter::new(42u64)
    };

    let locs = fetch_localizations(&resolver, &filter).expect("fetch");

    let ids: Vec<u64> = locs.iter().map(|loc| loc.id).collect();
    assert_eq!(ids, vec![100, 102]);
    // One listing per distinct (media, frame).
    assert_eq!(resolver.api().calls().list_localizations, 2);
}

#[test]
fn statetype_conflicts_with_frame_selection() {
    let resolver = Resolver::new(survey_api());
    let filter = LocalizationFilter {
        statetype: Some(Query::from("Frame Check")),
        ids: vec![100],
        ..LocalizationFilter::new(42u64)
    };
    let err = fetch_localizations(&resolver, &filter).expect_err("conflict");
    assert!(matches!(err, TatorError::InvalidArgument(_)));
    assert_eq!(resolver.api().remote_calls(), 0);
}

#[test]
fn frames_and_chips_are_downloaded_once() {
    let locs = vec![
        localization(100, 9, 12),
        localization(101, 9, 12),
        localization(102, 9, 40),
    ];
    let api = survey_api();
    let dir = tempfile::tempdir().expect("tempdir");

    assert_eq!(download_frames(&api, &locs, dir.path()).expect("frames"), 2);
    assert_eq!(download_frames(&api, &locs, dir.path()).expect("frames again"), 0);
    assert_eq!(
        std::fs::read(dir.path().join("9_40.png")).expect("frame file"),
        b"frame-9-40"
    );

    let chips = dir.path().join("chips");
    assert_eq!(download_chips(&api, &locs, &chips).expect("chips"), 3);
    assert!(chips.join("9_12_101.png").is_file());
    assert_eq!(api.calls().graphics, 3);
}

#[test]
fn upload_resolves_media_names_and_batches() {
    let resolver = Resolver::new(survey_api());
    let mut csv = String::from("media,frame,x,y,width,height,Class,version,Score\n");
    for frame in (0..BATCH_SIZE + 2).rev() {
        csv.push_str(&format!("cam7_2023.mp4,{frame},0.1,0.2,0.3,0.4,diatom,1,0.9\n"));
    }
    let mut table = Table::from_csv_str(&csv).expect("csv");

    let specs = localization_specs(&resolver, &mut table, 42, 3, 2, &["Score".to_string()])
        .expect("specs");
    let created = upload_localizations(resolver.api(), 42, &specs).expect("upload");

    assert_eq!(created.len(), BATCH_SIZE + 2);
    assert_eq!(specs[0].frame, 0);
    assert_eq!(specs[0].media_id, 9);
    assert_eq!(specs[0].version, 2);
    let keys: Vec<&String> = specs[0].attributes.keys().collect();
    assert_eq!(keys, vec!["Class"]);

    let batches = resolver.api().localization_batches.borrow();
    let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![BATCH_SIZE, 2]);
    // Media name lookups hit the server once.
    assert_eq!(resolver.api().calls().list, 1);
}

#[test]
fn upload_requires_box_columns() {
    let resolver = Resolver::new(survey_api());
    let mut table = Table::from_csv_str("media,frame,x,y\nclip.mp4,1,0,0\n").expect("csv");
    let err = localization_specs(&resolver, &mut table, 42, 3, 2, &[]).expect_err("missing");
    assert!(err.to_string().contains("width, height"));
}

#[test]
fn per_row_states_upload() {
    let api = survey_api();
    let mut table = Table::from_csv_str(
        "media_id,frame,statetype_id,version_id,Verified\n9,4,5,2,true\n9,1,5,3,false\n",
    )
    .expect("csv");

    let specs = state_specs(&mut table, StateTarget::PerRow).expect("specs");
    upload_states(&api, 42, &specs).expect("upload");

    assert_eq!(specs[0].frame, 1);
    assert_eq!(specs[0].version, 3);
    assert_eq!(specs[1].type_id, 5);
    assert_eq!(api.state_batches.borrow().len(), 1);
}

#[test]
fn per_row_states_need_id_columns() {
    let mut table = Table::from_csv_str("media_id,frame\n9,4\n").expect("csv");
    let err = state_specs(&mut table, StateTarget::PerRow).expect_err("missing ids");
    assert!(err.to_string().contains("statetype_id, version_id"));
}

#[test]
fn states_download_sorted_with_tiff_frames() {
    let api = survey_api()
        .with(EntityKind::Media, Some(42), Entity::new(10, "aaa.mp4").with_extra("dtype", "video"))
        .with_state(state(500, 9, 40))
        .with_state(state(501, 9, 12))
        .with_state(state(502, 10, 3));
    let resolver = Resolver::new(api);
    let filter = StateFilter {
        project: Scope::from("plankton-survey"),
        statetype: Query::from("Frame Check"),
        version: None,
        media: None,
        attributes: Vec::new(),
    };

    let table = download_states(&resolver, &filter).expect("states");

    assert_eq!(
        table.headers(),
        [
            "id",
            "media_id",
            "media",
            "frame",
            "modified_by",
            "modified_datetime",
            "Verified",
            "tiff_frame",
        ]
    );
    let ids: Vec<&str> = table.rows().iter().map(|row| row[0].as_str()).collect();
    assert_eq!(ids, vec!["502", "501", "500"]);
    assert_eq!(table.rows()[0][2], "aaa");
    assert_eq!(table.rows()[0][7], "");
    assert_eq!(table.rows()[1][7], "/data/cam7/000012.tiff");
    assert_eq!(table.rows()[1][5], "2023-03-21T09:00:00Z");
}
