use crate::models::{MachineRecord, PartialUpdate};
use crate::status::map_state_to_status;

/// Fusionne un delta partiel dans l'enregistrement précédent.
///
/// Tout champ absent du delta est recopié depuis `previous` ; les axes x/y/z
/// sont indépendants. `last_update` et `last_message_at` prennent toujours le
/// timestamp du delta.
pub fn reconcile(previous: &MachineRecord, delta: &PartialUpdate) -> MachineRecord {
    let mut next = previous.clone();

    if let Some(code) = delta.state_code {
        next.status = map_state_to_status(code);
    }

    let t = &delta.telemetry;
    let telemetry = &mut next.telemetry;
    overwrite(&mut telemetry.spindle_speed, t.spindle_speed);
    overwrite(&mut telemetry.feed_rate, t.feed_rate);
    overwrite(&mut telemetry.load, t.load);
    overwrite(&mut telemetry.temperature, t.temperature);
    overwrite(&mut telemetry.runtime, t.runtime);
    overwrite(&mut telemetry.axis_position.x, t.axis_x);
    overwrite(&mut telemetry.axis_position.y, t.axis_y);
    overwrite(&mut telemetry.axis_position.z, t.axis_z);

    overwrite(&mut next.business.part_count, delta.business.part_count);

    if let Some(job) = delta.job_no.as_deref().filter(|j| !j.is_empty()) {
        next.job_no = job.to_string();
    }

    next.last_update = delta.timestamp;
    next.last_message_at = Some(delta.timestamp);
    next
}

fn overwrite<T: Copy>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}
