
use serde_json::json;
use test_support::{db_path, request_ok, spawn_sidecar, temp_dir};

#[test]
fn saved_plan_survives_a_sidecar_restart() {
    let workspace = temp_dir("curriculumd-plan-save");

    let chapter;
    let objective;
    {
        let (_child, mut stdin, mut reader) = spawn_sidecar();
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "1",
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );

        let level = request_ok(
            &mut stdin,
            &mut reader,
            "2",
            "catalog.nodes.create",
            json!({ "kind": "level", "name": "Terminale" }),
        )["nodeId"]
            .as_str()
            .expect("nodeId")
            .to_string();
        let track = request_ok(
            &mut stdin,
            &mut reader,
            "3",
            "catalog.nodes.create",
            json!({ "kind": "track", "name": "Sciences", "parentId": level }),
        )["nodeId"]
            .as_str()
            .expect("nodeId")
            .to_string();
        let unit = request_ok(
            &mut stdin,
            &mut reader,
            "4",
            "catalog.nodes.create",
            json!({ "kind": "unit", "name": "Analysis", "parentId": track }),
        )["nodeId"]
            .as_str()
            .expect("nodeId")
            .to_string();
        chapter = request_ok(
            &mut stdin,
            &mut reader,
            "5",
            "catalog.nodes.create",
            json!({ "kind": "chapter", "name": "Limits", "parentId": unit }),
        )["nodeId"]
            .as_str()
            .expect("nodeId")
            .to_string();
        objective = request_ok(
            &mut stdin,
            &mut reader,
            "6",
            "catalog.objectives.create",
            json!({ "chapterId": chapter, "text": "Compute one-sided limits" }),
        )["objectiveId"]
            .as_str()
            .expect("objectiveId")
            .to_string();

        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "7",
            "selection.level",
            json!({ "nodeId": level }),
        );
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "8",
            "selection.track",
            json!({ "nodeId": track }),
        );
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "9",
            "selection.unit",
            json!({ "nodeId": unit }),
        );
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "10",
            "selection.chapter",
            json!({ "nodeId": chapter }),
        );
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "11",
            "selection.objectives.toggle",
            json!({ "objectiveId": objective }),
        );

        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "12",
            "plan.open",
            json!({ "chapterId": chapter }),
        );
        for (n, (id, kind, title)) in [
            ("i1", "sequence", "Limit definition"),
            ("i2", "activity", "Graph reading"),
            ("i3", "evaluation", "Short quiz"),
        ]
        .iter()
        .enumerate()
        {
            let _ = request_ok(
                &mut stdin,
                &mut reader,
                &format!("add-{}", n),
                "plan.items.add",
                json!({ "itemId": id, "kind": kind, "title": title }),
            );
        }
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "13",
            "plan.items.reorder",
            json!({ "itemIdOrder": ["i3", "i1", "i2"] }),
        );

        let saved = request_ok(&mut stdin, &mut reader, "14", "plan.save", json!({}));
        assert_eq!(saved["chapterId"].as_str(), Some(chapter.as_str()));
        assert_eq!(saved["itemCount"].as_u64(), Some(3));
    }

    // Fresh process, same workspace.
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "20",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let reopened = request_ok(
        &mut stdin,
        &mut reader,
        "21",
        "plan.open",
        json!({ "chapterId": chapter }),
    );
    let items = reopened["items"].as_array().expect("items");
    let ids: Vec<&str> = items.iter().map(|it| it["id"].as_str().expect("id")).collect();
    assert_eq!(ids, vec!["i3", "i1", "i2"]);
    let orders: Vec<i64> = items.iter().map(|it| it["order"].as_i64().expect("order")).collect();
    assert_eq!(orders, vec![1, 2, 3]);
    assert_eq!(items[0]["kind"].as_str(), Some("evaluation"));

    // The saved plan header carries the hierarchy path and objective set.
    let conn = rusqlite::Connection::open(db_path(&workspace)).expect("open db");
    let (level_id, objective_ids_json): (Option<String>, String) = conn
        .query_row(
            "SELECT level_id, objective_ids_json FROM chapter_plans WHERE chapter_id = ?",
            [&chapter],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .expect("chapter_plans row");
    assert!(level_id.is_some());
    let objective_ids: Vec<String> =
        serde_json::from_str(&objective_ids_json).expect("objective ids json");
    assert_eq!(objective_ids, vec![objective]);
}
