//! Running the scheduler on tokio's local task set.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::LocalSet;
use weave_core::component::{
    create_component, AsyncFactory, AsyncLoad, AsyncOptions, AsyncStatus, ComponentData, ComponentDef, Instance,
    Props,
};
use weave_core::host::TokioHost;
use weave_core::reactive::{Signal, WatchOptions, Watcher};
use weave_core::runtime::Runtime;
use weave_core::scheduler::{next_tick, tick};

/// Let spawned local tasks make progress.
async fn settle() {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}

fn async_parent(factory: &AsyncFactory, renders: &Rc<Cell<u32>>) -> Instance {
    let factory = factory.clone();
    let renders = Rc::clone(renders);
    let def = ComponentDef::builder()
        .name("parent")
        .render(move |vm| {
            renders.set(renders.get() + 1);
            create_component(&factory, ComponentData::new(), vm, Vec::new(), None)
        })
        .build();
    let vm = Instance::new(&def, Props::new());
    vm.mount();
    vm
}

#[tokio::test]
async fn writes_flush_once_per_tick() {
    LocalSet::new()
        .run_until(async {
            TokioHost::install();
            let count = Signal::new(0);
            let seen = Rc::new(RefCell::new(Vec::new()));
            let _watcher = {
                let (count, seen) = (count.clone(), Rc::clone(&seen));
                Watcher::user(
                    move || count.get(),
                    move |value: &i32, old| seen.borrow_mut().push((*value, old.copied())),
                    WatchOptions::default(),
                )
            };

            count.set(1);
            count.set(2);
            let after = Rc::new(Cell::new(0));
            {
                let (after, count) = (Rc::clone(&after), count.clone());
                next_tick(move || after.set(count.get_untracked()));
            }
            tick().await;

            assert_eq!(*seen.borrow(), vec![(2, Some(0))]);
            assert_eq!(after.get(), 2);
        })
        .await;
}

#[tokio::test]
async fn async_component_resolves_from_a_channel() {
    LocalSet::new()
        .run_until(async {
            TokioHost::install();
            let (send, receive) = oneshot::channel::<ComponentDef>();
            let factory = AsyncFactory::from_future(async move {
                receive.await.map_err(|err| err.to_string())
            });

            let renders = Rc::new(Cell::new(0));
            let parent = async_parent(&factory, &renders);
            assert_eq!(renders.get(), 1);
            assert!(parent.children().is_empty());

            let child = ComponentDef::builder().name("child").build();
            send.send(child).expect("receiver alive");
            settle().await;
            tick().await;

            assert_eq!(factory.status(), AsyncStatus::Resolved);
            assert_eq!(renders.get(), 2);
            let names: Vec<_> = parent.children().iter().filter_map(|vm| vm.name().map(str::to_owned)).collect();
            assert_eq!(names, vec!["child"]);
        })
        .await;
}

#[tokio::test]
async fn timeout_switches_to_the_error_component() {
    LocalSet::new()
        .run_until(async {
            TokioHost::install();
            Runtime::set_warn_handler(|_| {});
            let error = ComponentDef::builder().name("failed").build();
            let factory = {
                let error = error.clone();
                AsyncFactory::new(move |_, _| {
                    AsyncLoad::Advanced(
                        AsyncOptions::new(futures_util::future::pending())
                            .error(error)
                            .timeout(Duration::from_millis(20)),
                    )
                })
            };

            let renders = Rc::new(Cell::new(0));
            let parent = async_parent(&factory, &renders);
            tokio::time::sleep(Duration::from_millis(60)).await;
            settle().await;
            tick().await;

            assert_eq!(factory.status(), AsyncStatus::Errored);
            assert_eq!(renders.get(), 2);
            assert_eq!(parent.children().first().and_then(|vm| vm.name().map(str::to_owned)).as_deref(), Some("failed"));
            Runtime::clear_warn_handler();
        })
        .await;
}
