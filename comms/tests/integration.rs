use comms::{
    msg::{Command, Msg, Payload},
    specs::round::{ConfigValue, FitIns, RoundConfig, TensorSpec},
};
use tokio::io;

#[tokio::test]
async fn fit_request_then_params_over_duplex() -> io::Result<()> {
    const SIZE: usize = 64;

    let (one, two) = io::duplex(SIZE);
    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);
    let (rx, two_tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, two_tx);

    let ins = FitIns {
        config: RoundConfig::new().with(RoundConfig::EPOCHS_OVERRIDE, ConfigValue::Int(2)),
        layout: vec![
            TensorSpec {
                name: "w".into(),
                shape: vec![2, 3],
            },
            TensorSpec {
                name: "b".into(),
                shape: vec![3],
            },
        ],
    };
    let params: Vec<f32> = (0..9).map(|i| i as f32 * 0.5).collect();

    let sender = async {
        tx.send(&Msg::Control(Command::Fit(ins.clone()))).await?;
        tx.send(&Msg::Data(Payload::Params(&params))).await?;
        tx.send(&Msg::Err("shape mismatch".into())).await
    };

    let receiver = async {
        let mut buf: Vec<u32> = Vec::new();

        let Msg::Control(Command::Fit(got)) = rx.recv_into(&mut buf).await? else {
            panic!("expected a fit command");
        };
        assert_eq!(got, ins);

        let Msg::Data(Payload::Params(got)) = rx.recv_into(&mut buf).await? else {
            panic!("expected a params payload");
        };
        assert_eq!(got, params.as_slice());

        let Msg::Err(reason) = rx.recv_into(&mut buf).await? else {
            panic!("expected an error");
        };
        assert_eq!(reason, "shape mismatch");
        Ok::<_, io::Error>(())
    };

    tokio::try_join!(sender, receiver)?;
    Ok(())
}

#[tokio::test]
async fn closed_stream_is_an_error() {
    let (one, two) = io::duplex(16);
    drop(one);

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);
    let mut buf: Vec<u32> = Vec::new();

    let res: io::Result<Msg> = rx.recv_into(&mut buf).await;
    assert!(res.is_err());
}

#[tokio::test]
async fn oversized_frame_header_is_refused() -> io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let (mut one, two) = io::duplex(64);
    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    one.write_all(&(u64::MAX).to_be_bytes()).await?;

    let mut buf: Vec<u32> = Vec::new();
    let err = rx.recv_into::<Msg, _>(&mut buf).await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    assert!(buf.is_empty());
    Ok(())
}
