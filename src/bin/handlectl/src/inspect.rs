use miette::miette;
use user_handles::{ObjectType, SessionView, UserHandle};

pub fn stat(view: &SessionView) -> miette::Result<()> {
    let session = view.session();
    let header = session.header();
    let limits = session.limits();
    let live = session.iter(None).count();
    println!("magic       {:#010x}", header.magic());
    println!("version     {}", header.version());
    println!("region      {} bytes", view.len());
    println!("first index {:#x}", limits.first_index);
    println!("max handles {:#x}", header.max_handles());
    println!("nb handles  {:#x}", session.nb_handles());
    println!("live        {}", live);
    Ok(())
}

pub fn list(view: &SessionView, ty: Option<ObjectType>) -> miette::Result<()> {
    for (handle, info) in view.session().iter(ty) {
        println!(
            "{}\t{}\t{}\tpid {} tid {}",
            handle, info.ty, info.object, info.owner.pid, info.owner.tid
        );
    }
    Ok(())
}

pub fn resolve(view: &SessionView, handle: UserHandle, ty: ObjectType) -> miette::Result<()> {
    let object = view
        .session()
        .get(handle, ty)
        .ok_or_else(|| miette!("{} does not name a live {}", handle, ty))?;
    println!("{}", object);
    Ok(())
}

pub fn canon(view: &SessionView, handle: UserHandle) -> miette::Result<()> {
    println!("{}", view.session().full_handle(handle));
    Ok(())
}
