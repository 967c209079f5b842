use pruner_test_support::fixtures::{catalog_torrents, pick};
use pruner_torrent_core::{Bytes, Filters, Status, apply_filters};

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_string()).collect()
}

#[test]
fn catalog_cases_follow_exclusion_then_inclusion_order() {
    let catalog = catalog_torrents();
    let cases: Vec<(&str, Filters, Vec<usize>)> = vec![
        ("no filter", Filters::default(), vec![0, 1, 2, 3, 4, 5, 6]),
        (
            "exclude movies",
            Filters {
                excluded_categories: strings(&["Movies"]),
                ..Filters::default()
            },
            vec![1, 2, 3, 5, 6],
        ),
        (
            "exclude hd tag",
            Filters {
                excluded_tags: strings(&["hd"]),
                ..Filters::default()
            },
            vec![1, 2, 3, 4, 5],
        ),
        (
            "exclude paused or error",
            Filters {
                excluded_status: vec![Status::PAUSED, Status::ERROR],
                ..Filters::default()
            },
            vec![0, 1, 3, 4, 5],
        ),
        (
            "exclude tracker b",
            Filters {
                excluded_trackers: strings(&["tracker.b.com"]),
                ..Filters::default()
            },
            vec![1, 2, 3, 4, 5, 6],
        ),
        (
            "only tv shows",
            Filters {
                categories: strings(&["TV Shows"]),
                ..Filters::default()
            },
            vec![1, 5, 6],
        ),
        (
            "only 4k",
            Filters {
                tags: strings(&["4k"]),
                ..Filters::default()
            },
            vec![1],
        ),
        (
            "only uploading",
            Filters {
                status: vec![Status::UPLOADING],
                ..Filters::default()
            },
            vec![0, 3, 4, 5],
        ),
        (
            "only paused or error",
            Filters {
                status: vec![Status::PAUSED, Status::ERROR],
                ..Filters::default()
            },
            vec![2, 6],
        ),
        (
            "tracker a with anime or hd",
            Filters {
                trackers: strings(&["tracker.a.com"]),
                tags: strings(&["anime", "hd"]),
                ..Filters::default()
            },
            vec![0, 6],
        ),
        (
            "not movies but uploading",
            Filters {
                excluded_categories: strings(&["Movies"]),
                status: vec![Status::UPLOADING],
                ..Filters::default()
            },
            vec![3, 5],
        ),
        (
            "movies without old",
            Filters {
                excluded_tags: strings(&["old"]),
                categories: strings(&["Movies"]),
                ..Filters::default()
            },
            vec![0],
        ),
        (
            "missing tag",
            Filters {
                tags: strings(&["nonexistent_tag"]),
                ..Filters::default()
            },
            vec![],
        ),
    ];

    for (name, filters, expected) in cases {
        let actual = apply_filters(&filters, Bytes(2048), &catalog);
        assert_eq!(actual, pick(&catalog, &expected), "case: {name}");
    }
}

#[test]
fn disk_gate_decides_before_any_criterion() {
    let catalog = catalog_torrents();
    let plenty = Filters {
        disk: Bytes(1024),
        ..Filters::default()
    };
    assert!(apply_filters(&plenty, Bytes(2048), &catalog).is_empty());

    let short = Filters {
        disk: Bytes(4096),
        ..Filters::default()
    };
    assert_eq!(apply_filters(&short, Bytes(2048), &catalog), catalog);
}

#[test]
fn empty_input_stays_empty() {
    let filters = Filters {
        categories: strings(&["Movies"]),
        ..Filters::default()
    };
    assert!(apply_filters(&filters, Bytes::ZERO, &[]).is_empty());
}

#[test]
fn filters_load_from_yaml() -> anyhow::Result<()> {
    let filters: Filters = serde_yaml::from_str(
        "categories: Movies\nexcluded_status: [pausedUP, error]\ntrackers:\n  - tracker.a.com\ndisk: 10GiB\n",
    )?;
    assert_eq!(filters.categories, strings(&["Movies"]));
    assert_eq!(
        filters.excluded_status,
        vec![Status::PAUSED | Status::UPLOADING, Status::ERROR]
    );
    assert_eq!(filters.disk, Bytes(10 * 1024 * 1024 * 1024));
    Ok(())
}
