use state_machines::state_machine;

state_machine! {
    name: AskMachine,
    state: AskState,
    initial: Ready,
    states: [Ready, CacheChecked, Retrieved, Composed, CacheWritten, Completed, Failed],
    events {
        check_cache { transition: { from: Ready, to: CacheChecked } }
        retrieve { transition: { from: CacheChecked, to: Retrieved } }
        compose { transition: { from: Retrieved, to: Composed } }
        write_cache { transition: { from: Composed, to: CacheWritten } }
        complete {
            transition: { from: CacheChecked, to: Completed }
            transition: { from: CacheWritten, to: Completed }
        }
        abort {
            transition: { from: CacheChecked, to: Failed }
        }
    }
}

pub fn ready() -> AskMachine<(), Ready> {
    AskMachine::new(())
}
