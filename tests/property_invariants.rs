use proptest::prelude::*;

use classsync::{
    assets::memory::MemoryObjectStore,
    node::{ClassroomTree, LessonNode, ModuleNode, Mutation, NodeHeader},
    persist::{
        ContentStore,
        sqlite::{SqliteContentStore, Table},
    },
    reconcile::Reconciler,
    record::{ClassroomInfo, StoredClassroom},
    types::NodeId,
};

#[derive(Debug, Clone)]
struct LessonShape {
    position: i64,
}

#[derive(Debug, Clone)]
struct ModuleShape {
    position: i64,
    lessons: Vec<LessonShape>,
}

#[derive(Debug, Clone)]
enum Edit {
    Reposition { module: usize, position: i64 },
    DeleteModule { module: usize },
    DeleteLesson { module: usize, lesson: usize },
    MoveLesson { from: usize, lesson: usize, to: usize, position: i64 },
    AddLesson { module: usize, position: i64 },
}

fn tree_strategy() -> impl Strategy<Value = Vec<ModuleShape>> {
    let lesson = (-3i64..8).prop_map(|position| LessonShape { position });
    let module = ((-3i64..8), prop::collection::vec(lesson, 0..5))
        .prop_map(|(position, lessons)| ModuleShape { position, lessons });
    prop::collection::vec(module, 1..5)
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0usize..8, -3i64..8).prop_map(|(module, position)| Edit::Reposition { module, position }),
        (0usize..8).prop_map(|module| Edit::DeleteModule { module }),
        (0usize..8, 0usize..8).prop_map(|(module, lesson)| Edit::DeleteLesson { module, lesson }),
        (0usize..8, 0usize..8, 0usize..8, -3i64..8)
            .prop_map(|(from, lesson, to, position)| Edit::MoveLesson { from, lesson, to, position }),
        (0usize..8, -3i64..8).prop_map(|(module, position)| Edit::AddLesson { module, position }),
    ]
}

fn build(classroom: i64, shapes: &[ModuleShape]) -> ClassroomTree {
    let mut tree = ClassroomTree::new(classroom);
    for (m, shape) in shapes.iter().enumerate() {
        let lessons = shape
            .lessons
            .iter()
            .enumerate()
            .map(|(l, lesson)| new_lesson(&format!("l-{m}-{l}"), lesson.position))
            .collect();
        tree.modules.push(ModuleNode {
            header: NodeHeader::new(temp(&format!("m-{m}")), shape.position),
            name: format!("module {m}"),
            description: String::new(),
            lessons,
        });
    }
    tree
}

fn temp(raw: &str) -> NodeId {
    NodeId::parse(raw).expect("id")
}

fn new_lesson(raw: &str, position: i64) -> LessonNode {
    LessonNode {
        header: NodeHeader::new(temp(raw), position),
        name: raw.to_string(),
        video_url: None,
        video_type: None,
        text_content: None,
        resources: Vec::new(),
    }
}

fn live_module(tree: &ClassroomTree, idx: usize) -> Option<usize> {
    let live: Vec<usize> = (0..tree.modules.len())
        .filter(|i| !tree.modules[*i].header.mutation.is_deleted())
        .collect();
    if live.is_empty() {
        None
    } else {
        Some(live[idx % live.len()])
    }
}

fn apply(tree: &mut ClassroomTree, edit: &Edit, serial: usize) {
    match *edit {
        Edit::Reposition { module, position } => {
            if let Some(m) = live_module(tree, module) {
                let header = &mut tree.modules[m].header;
                header.position = position;
                header.mutation = Mutation::Reordered;
            }
        }
        Edit::DeleteModule { module } => {
            if let Some(m) = live_module(tree, module) {
                tree.modules[m].header.mutation = Mutation::Deleted;
                for lesson in &mut tree.modules[m].lessons {
                    lesson.header.mutation = Mutation::Deleted;
                }
            }
        }
        Edit::DeleteLesson { module, lesson } => {
            if let Some(m) = live_module(tree, module) {
                let lessons = &mut tree.modules[m].lessons;
                if !lessons.is_empty() {
                    let n = lessons.len();
                    lessons[lesson % n].header.mutation = Mutation::Deleted;
                }
            }
        }
        Edit::MoveLesson { from, lesson, to, position } => {
            let (Some(from), Some(to)) = (live_module(tree, from), live_module(tree, to)) else {
                return;
            };
            let lessons = &tree.modules[from].lessons;
            let candidates: Vec<usize> = (0..lessons.len())
                .filter(|i| !lessons[*i].header.mutation.is_deleted())
                .collect();
            if candidates.is_empty() || from == to {
                return;
            }
            let mut moved = tree.modules[from].lessons.remove(candidates[lesson % candidates.len()]);
            moved.header.parent_id = Some(tree.modules[to].header.id.clone());
            moved.header.position = position;
            moved.header.mutation = Mutation::Moved;
            tree.modules[to].lessons.push(moved);
        }
        Edit::AddLesson { module, position } => {
            if let Some(m) = live_module(tree, module) {
                tree.modules[m]
                    .lessons
                    .push(new_lesson(&format!("l-new-{serial}"), position));
            }
        }
    }
}

fn assert_dense(stored: &StoredClassroom) -> Result<(), TestCaseError> {
    let positions: Vec<i64> = stored.modules.iter().map(|m| m.record.position).collect();
    prop_assert_eq!(positions.clone(), (0..positions.len() as i64).collect::<Vec<_>>());
    for module in &stored.modules {
        let positions: Vec<i64> = module.lessons.iter().map(|l| l.record.position).collect();
        prop_assert_eq!(positions.clone(), (0..positions.len() as i64).collect::<Vec<_>>());
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn positions_stay_dense_and_promoted_trees_resync_as_noops(
        shapes in tree_strategy(),
        edits in prop::collection::vec(edit_strategy(), 0..12),
    ) {
        let mut store = SqliteContentStore::open_in_memory().expect("open sqlite");
        let classroom = store
            .create_classroom(&ClassroomInfo::default(), false)
            .expect("classroom");
        let mut objects = MemoryObjectStore::default();

        let mut tree = build(classroom, &shapes);
        let report = Reconciler::new(&mut store, &mut objects).sync(&tree).expect("initial sync");
        tree.promote(&report);
        assert_dense(&store.load_classroom(classroom).expect("load").expect("tree"))?;

        for (serial, edit) in edits.iter().enumerate() {
            apply(&mut tree, edit, serial);
        }
        let report = Reconciler::new(&mut store, &mut objects).sync(&tree).expect("edit sync");
        prop_assert!(report.delete_failures.is_empty());
        tree.promote(&report);

        let stored = store.load_classroom(classroom).expect("load").expect("tree");
        assert_dense(&stored)?;
        let live_modules = tree.modules.len();
        let live_lessons: usize = tree.modules.iter().map(|m| m.lessons.len()).sum();
        prop_assert_eq!(stored.modules.len(), live_modules);
        prop_assert_eq!(store.count_rows(Table::Lessons).expect("count") as usize, live_lessons);

        let rows_before = (
            store.count_rows(Table::Modules).expect("count"),
            store.count_rows(Table::Lessons).expect("count"),
        );
        let again = Reconciler::new(&mut store, &mut objects).sync(&tree).expect("resync");
        prop_assert!(again.is_noop(), "resync wrote: {:?}", again);
        let rows_after = (
            store.count_rows(Table::Modules).expect("count"),
            store.count_rows(Table::Lessons).expect("count"),
        );
        prop_assert_eq!(rows_before, rows_after);
        prop_assert_eq!(store.load_classroom(classroom).expect("load").expect("tree"), stored);
    }
}
